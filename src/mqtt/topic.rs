//! Topic filter matching.
//!
//! Subscription filters are matched against received topic names level
//! by level. `+` matches exactly one level, `#` matches all remaining
//! levels and is only meaningful as the final level of the filter.
//! Literal levels match case-sensitively.

/// Returns true iff `filter` matches the topic name `topic`.
///
/// # Examples
///
/// ```rust
/// use libmqtt::mqtt::topic::matches;
///
/// assert!(matches("sport/+/player1", "sport/tennis/player1"));
/// assert!(matches("sport/#", "sport/tennis/player1"));
/// assert!(!matches("sport/+", "sport/tennis/player1"));
/// ```
pub fn matches(filter: &str, topic: &str) -> bool {
    if filter == topic {
        return true;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(pattern), Some(level)) => {
                if pattern != level {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
