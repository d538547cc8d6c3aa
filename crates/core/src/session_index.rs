// crates/core/src/session_index.rs
//! Reduction rule for collapsing duplicate session events into one
//! index entry per request id.
//!
//! Multiple emission points report the same request with partially
//! populated fields. The index keeps the lexicographic maximum of the
//! non-null `session` and `user` values and the minimum of `site`.
//! "Most recent write wins" and "first non-empty" are not equivalent
//! substitutes: they differ observably on real streams.

use vizperf_types::{RawSessionEvent, SessionIndexEntry};

/// Collapse every event sharing `request_id` into one entry.
///
/// Null fields are ignored by the reduction; a field that is null in
/// every event of the group stays null in the entry.
pub fn reduce_session_events(request_id: &str, events: &[RawSessionEvent]) -> SessionIndexEntry {
    SessionIndexEntry {
        request_id: request_id.to_string(),
        session: max_field(events, |e| e.session.as_deref()),
        user: max_field(events, |e| e.user.as_deref()),
        site: min_field(events, |e| e.site.as_deref()),
    }
}

fn max_field<'a, F>(events: &'a [RawSessionEvent], field: F) -> Option<String>
where
    F: Fn(&'a RawSessionEvent) -> Option<&'a str>,
{
    events
        .iter()
        .filter_map(field)
        .max()
        .map(|s| s.to_string())
}

fn min_field<'a, F>(events: &'a [RawSessionEvent], field: F) -> Option<String>
where
    F: Fn(&'a RawSessionEvent) -> Option<&'a str>,
{
    events
        .iter()
        .filter_map(field)
        .min()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(session: Option<&str>, user: Option<&str>, site: Option<&str>) -> RawSessionEvent {
        RawSessionEvent {
            request_id: "r1".to_string(),
            session: session.map(Into::into),
            user: user.map(Into::into),
            site: site.map(Into::into),
        }
    }

    #[test]
    fn test_session_takes_lexicographic_max() {
        let events = [
            event(Some("a"), None, None),
            event(Some("b"), None, None),
            event(Some(""), None, None),
        ];
        let entry = reduce_session_events("r1", &events);
        assert_eq!(entry.session.as_deref(), Some("b"));
    }

    #[test]
    fn test_site_takes_lexicographic_min() {
        let events = [
            event(None, None, Some("siteB")),
            event(None, None, Some("siteA")),
            event(None, None, Some("siteC")),
        ];
        let entry = reduce_session_events("r1", &events);
        assert_eq!(entry.site.as_deref(), Some("siteA"));
    }

    #[test]
    fn test_user_takes_lexicographic_max() {
        let events = [event(None, Some("DOM\\alice"), None), event(None, Some("DOM\\bob"), None)];
        let entry = reduce_session_events("r1", &events);
        assert_eq!(entry.user.as_deref(), Some("DOM\\bob"));
    }

    #[test]
    fn test_nulls_are_ignored_not_preferred() {
        // A null never beats a present value, in either direction.
        let events = [event(None, None, None), event(Some("s9"), Some("u1"), Some("z"))];
        let entry = reduce_session_events("r1", &events);
        assert_eq!(entry.session.as_deref(), Some("s9"));
        assert_eq!(entry.user.as_deref(), Some("u1"));
        assert_eq!(entry.site.as_deref(), Some("z"));
    }

    #[test]
    fn test_all_null_group_stays_null() {
        let events = [event(None, None, None), event(None, None, None)];
        let entry = reduce_session_events("r1", &events);
        assert_eq!(entry.session, None);
        assert_eq!(entry.user, None);
        assert_eq!(entry.site, None);
    }

    #[test]
    fn test_empty_string_is_a_value_not_a_null() {
        // "" participates in the reduction: it loses a max against
        // any non-empty string and wins a min.
        let events = [event(Some(""), None, Some("")), event(Some("a"), None, Some("siteA"))];
        let entry = reduce_session_events("r1", &events);
        assert_eq!(entry.session.as_deref(), Some("a"));
        assert_eq!(entry.site.as_deref(), Some(""));
    }
}
