/// Environment-driven configuration of the sync layer.
pub mod config_env;
/// File-backed settings blob holding the admin credential.
pub mod settings_store;
