use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// Diagnostic output settings. Diagnostics always go to stderr so command
/// output on stdout stays machine-readable.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `rotor_core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    /// Settings for an operator-facing command: no targets, colour only on a terminal.
    pub fn for_cli(format: LoggerFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
            with_targets: false,
            use_color: std::io::stderr().is_terminal(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: cfg!(test) || std::io::stderr().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_settings_hide_targets() {
        let cfg = LoggerConfig::for_cli(LoggerFormat::Json, "rotor_core=debug");
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "rotor_core=debug");
        assert!(!cfg.with_targets);
    }
}
