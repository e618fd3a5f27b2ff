use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] hue2mqtt_config::ConfigError),

    #[error(transparent)]
    Bridge(#[from] hue2mqtt_core::BridgeError),

    #[error(transparent)]
    Api(#[from] hue2mqtt_api::ApiError),
}

impl CliError {
    /// Exit code: 2 for configuration problems (fix the file), 1 for
    /// everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Bridge(hue2mqtt_core::BridgeError::Config { .. }) => 2,
            _ => 1,
        }
    }
}
