//! Constants and configuration values for Thermzone
//!
//! Centralizes all magic numbers, paths, and configuration defaults.
//! Add new values here rather than scattering literals across the engine.

/// System paths
pub mod paths {
    /// Directory name under the user's config base
    pub const CONFIG_DIR_NAME: &str = "thermzone";

    /// Settings file name inside the config directory
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Default daemon socket when /run is available
    pub const SOCKET_PATH: &str = "/run/thermzone.sock";

    /// Fallback daemon socket for systems without /run
    pub const SOCKET_PATH_FALLBACK: &str = "/var/run/thermzone.sock";

    /// Environment variable overriding the socket path for clients
    pub const SOCKET_ENV: &str = "THERMZONE_SOCKET";

    /// User configuration directory
    ///
    /// Resolution order: `XDG_CONFIG_HOME`, `$HOME/.config`, then whatever
    /// `dirs` reports for the platform.
    pub fn user_config_dir() -> Option<std::path::PathBuf> {
        let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            Some(std::path::PathBuf::from(xdg))
        } else if let Ok(home) = std::env::var("HOME") {
            Some(std::path::PathBuf::from(home).join(".config"))
        } else {
            dirs::config_dir()
        };

        base.map(|p| p.join(CONFIG_DIR_NAME))
    }

    /// Socket path the daemon listens on by default
    pub fn default_socket_path() -> String {
        if std::path::Path::new("/run").exists() {
            SOCKET_PATH.to_string()
        } else {
            SOCKET_PATH_FALLBACK.to_string()
        }
    }
}

/// Simulated sensor parameters
pub mod sensor {
    /// Reading the sensor powers up with and resets to when the camera turns off.
    /// Units are tenths of a kelvin (2940 = 20.85 °C).
    pub const RESET_TEMPERATURE: u32 = 2940;

    /// Lower edge of the band published when nothing is pending
    pub const BAND_FLOOR: u32 = 0;

    /// Upper edge of the band published when nothing is pending
    pub const BAND_CEILING: u32 = u32::MAX;
}

/// Limits on outstanding requests
pub mod limits {
    /// Default maximum number of queued watch requests per zone
    pub const MAX_PENDING: usize = 1024;

    /// Smallest accepted `max_pending` setting
    pub const MIN_PENDING: usize = 1;
}

/// Timing values
pub mod timing {
    /// Millisecond timeout value that means "never expire"
    pub const INFINITE_TIMEOUT_MS: u32 = u32::MAX;
}

/// Logging defaults
pub mod logging {
    /// Environment variable holding the tracing filter
    pub const LOG_ENV: &str = "THERMZONE_LOG";

    /// Filter used when neither the environment nor settings provide one
    pub const DEFAULT_LEVEL: &str = "info";
}
