//! Channel engine configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every channel the manager creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Server name used as the source of numeric replies.
    pub server_name: String,

    /// Flag modes a freshly created channel starts with.
    pub default_modes: String,

    /// How many channels one nickname may be in at once. 0 = unlimited.
    pub max_channels_per_user: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_name: "irc.local".into(),
            default_modes: "nt".into(),
            max_channels_per_user: 20,
        }
    }
}

/// Returns `true` if `name` is a usable channel name.
///
/// It must start with `#` or `&`, be at most 50 characters, and contain
/// no space, comma, BEL or NUL.
pub fn is_valid_channel_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('#' | '&'))
        && name.len() > 1
        && name.len() <= 50
        && !name.chars().any(|c| matches!(c, ' ' | ',' | '\x07' | '\0' | '\r' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.default_modes, "nt");
        assert_eq!(config.max_channels_per_user, 20);
    }

    #[test]
    fn test_is_valid_channel_name() {
        assert!(is_valid_channel_name("#rust"));
        assert!(is_valid_channel_name("&local"));
        assert!(!is_valid_channel_name("rust"));
        assert!(!is_valid_channel_name("#"));
        assert!(!is_valid_channel_name("#a,b"));
        assert!(!is_valid_channel_name("#with space"));
        assert!(!is_valid_channel_name(&format!("#{}", "x".repeat(50))));
    }
}
