pub mod server;

use secrecy::SecretString;

use crate::policy::PolicySettings;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        issuer: String,
        backup_pepper: Option<SecretString>,
        settings: PolicySettings,
    },
}
