//! User customization and settings.

/// Global settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// The number of most recently selected cards that are kept out of the weighted draw.
    pub recent_window: usize,
    /// The number of selections after which a missed card is forced back into rotation.
    pub requeue_delay: i64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            recent_window: 5,
            requeue_delay: 5,
        }
    }
}
