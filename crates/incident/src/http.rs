//! URL building shared by the provider clients.

use reqwest::Url;

use crate::error::ClientError;

/// Join percent-encoded path segments onto an API base URL.
///
/// Each segment is encoded on its own, so ids taken from requests cannot
/// add or climb path levels.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ClientError> {
    let invalid = || ClientError::InvalidUrl(format!("invalid API base URL {base}"));

    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|()| invalid())?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint(
            "https://www.googleapis.com/calendar/v3",
            &["calendars", "team#ops@group.calendar.google.com", "events"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team%23ops@group.calendar.google.com/events"
        );
    }

    #[test]
    fn test_endpoint_keeps_traversal_in_one_segment() {
        let url = endpoint("https://api.pagerduty.com/", &["incidents", "../users", "alerts"]).unwrap();
        assert_eq!(url.as_str(), "https://api.pagerduty.com/incidents/..%2Fusers/alerts");
    }

    #[test]
    fn test_endpoint_rejects_invalid_base() {
        assert!(matches!(
            endpoint("not a url", &["x"]),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
