//! Default TOML config template with inline documentation comments.

use crate::schema::CONFIG_SCHEMA_VERSION;

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    format!(
        r##"# Analyst client configuration
# Schema version {CONFIG_SCHEMA_VERSION}
# Only override what you want to change -- missing fields use defaults.

[deployment]
# Path to the aws-exports.json published with the web app.
# exports_path = "/path/to/aws-exports.json"
# Explicit endpoint; takes precedence over exports_path.
# websocket_endpoint = "wss://dxxxxxxxx.cloudfront.net/wss/"

[session]
# token_param = "idToken"
# reconnect = "immediate"     # immediate, backoff
# reconnect_initial_ms = 500  # backoff only
# reconnect_max_ms = 30000    # backoff only
# connect_timeout_secs = 15   # 0 = none
# keepalive_secs = 0          # 0 = no client pings
# request_timeout_secs = 300

[auth]
# username = ""
# password_env = "ANALYST_PASSWORD"
# token_env = "ANALYST_ID_TOKEN"
# region = ""                 # default: from exports
# client_id = ""              # default: Auth.Cognito.userPoolClientId

[logging]
# level = "info"              # trace, debug, info, warn, error
"##
    )
}
