//! Process-wide subscriber setup

use std::sync::Once;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable lines on stderr, debug for statedir crates
    Development,
    /// JSON lines on stderr, info for the stagers and above
    Production,
    /// Bare registry; pair with `init_test_capture()` to record events
    Test,
}

impl Profile {
    /// Filter used when `RUST_LOG` is unset
    pub fn default_filter(self) -> &'static str {
        match self {
            Profile::Development => {
                "info,statedir_core=debug,statedir_store=debug,statedir_engine=debug,statedir_cli=debug"
            }
            Profile::Production => "warn,statedir_store=info,statedir_engine=info,statedir_cli=info",
            Profile::Test => "trace",
        }
    }

    fn filter(self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_filter()))
    }
}

static INIT: Once = Once::new();

/// Install the global subscriber for `profile`
///
/// Only the first call in a process has any effect. Logs always go to stderr
/// so command output on stdout stays machine-readable.
pub fn init(profile: Profile) {
    INIT.call_once(|| {
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(profile.filter())
                .try_init()
                .is_ok(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_current_span(false)
                .with_writer(std::io::stderr)
                .with_env_filter(profile.filter())
                .try_init()
                .is_ok(),
            Profile::Test => tracing_subscriber::registry().try_init().is_ok(),
        };
        if !installed {
            tracing::debug!(?profile, "global subscriber already set, keeping it");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_ignored() {
        init(Profile::Test);
        init(Profile::Development);
    }

    #[test]
    fn test_default_filters_parse() {
        for profile in [Profile::Development, Profile::Production, Profile::Test] {
            assert!(EnvFilter::try_new(profile.default_filter()).is_ok());
        }
    }
}
