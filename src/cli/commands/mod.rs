use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

use crate::policy::{EnforcementPolicy, GraceUnit};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

fn validator_enforcement_policy() -> ValueParser {
    ValueParser::from(
        move |value: &str| -> std::result::Result<EnforcementPolicy, String> {
            EnforcementPolicy::parse(value)
                .ok_or_else(|| format!("invalid enforcement policy: {value}"))
        },
    )
}

fn validator_grace_unit() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<GraceUnit, String> {
        GraceUnit::parse(value).ok_or_else(|| format!("invalid grace unit: {value}"))
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("tessera")
        .about("Second-factor authentication core")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("TESSERA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("issuer")
                .short('i')
                .long("issuer")
                .help("Issuer label for provisioning URIs and emails")
                .default_value("Tessera")
                .env("TESSERA_ISSUER"),
        )
        .arg(
            Arg::new("backup-pepper")
                .long("backup-pepper")
                .help("Site-wide secret mixed into backup-code hashes")
                .env("TESSERA_BACKUP_PEPPER"),
        )
        .arg(
            Arg::new("enforcement-policy")
                .long("enforcement-policy")
                .help("Who 2FA is enforced for: do-not-enforce, all-users, superadmins-only, superadmins-siteadmins-only, certain-roles-only, certain-users-only, enforce-on-multisite")
                .default_value("do-not-enforce")
                .env("TESSERA_ENFORCEMENT_POLICY")
                .value_parser(validator_enforcement_policy()),
        )
        .arg(
            Arg::new("enforced-roles")
                .long("enforced-roles")
                .help("Comma-separated roles 2FA is enforced for")
                .env("TESSERA_ENFORCED_ROLES"),
        )
        .arg(
            Arg::new("enforced-users")
                .long("enforced-users")
                .help("Comma-separated logins 2FA is enforced for")
                .env("TESSERA_ENFORCED_USERS"),
        )
        .arg(
            Arg::new("excluded-roles")
                .long("excluded-roles")
                .help("Comma-separated roles excluded from enforcement")
                .env("TESSERA_EXCLUDED_ROLES"),
        )
        .arg(
            Arg::new("excluded-users")
                .long("excluded-users")
                .help("Comma-separated logins excluded from enforcement")
                .env("TESSERA_EXCLUDED_USERS"),
        )
        .arg(
            Arg::new("included-sites")
                .long("included-sites")
                .help("Comma-separated site ids where 2FA applies")
                .env("TESSERA_INCLUDED_SITES"),
        )
        .arg(
            Arg::new("excluded-sites")
                .long("excluded-sites")
                .help("Comma-separated site ids excluded from enforcement")
                .env("TESSERA_EXCLUDED_SITES"),
        )
        .arg(
            Arg::new("multisite")
                .long("multisite")
                .help("Treat the deployment as a multisite network")
                .env("TESSERA_MULTISITE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exclude-superadmins")
                .long("exclude-superadmins")
                .help("Never enforce 2FA for super-admins")
                .env("TESSERA_EXCLUDE_SUPERADMINS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("enforce-superadmins")
                .long("enforce-superadmins")
                .help("Also enforce super-admins under the certain-roles/users policies")
                .env("TESSERA_ENFORCE_SUPERADMINS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("grace-period")
                .long("grace-period")
                .help("Grace window before enforcement locks unconfigured users (0 = instant)")
                .default_value("0")
                .env("TESSERA_GRACE_PERIOD")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("grace-unit")
                .long("grace-unit")
                .help("Unit for the grace period: hours, days, seconds")
                .default_value("days")
                .env("TESSERA_GRACE_UNIT")
                .value_parser(validator_grace_unit()),
        )
        .arg(
            Arg::new("enabled-methods")
                .long("enabled-methods")
                .help("Comma-separated methods users may enable: totp, email, backup-codes")
                .default_value("totp,email,backup-codes")
                .env("TESSERA_ENABLED_METHODS"),
        )
        .arg(
            Arg::new("max-attempts")
                .long("max-attempts")
                .help("Verification attempts before the challenge is exhausted")
                .default_value("5")
                .env("TESSERA_MAX_ATTEMPTS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("disable-attempt-limit")
                .long("disable-attempt-limit")
                .help("Turn the attempt limiter off")
                .env("TESSERA_DISABLE_ATTEMPT_LIMIT")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("nonce-ttl")
                .long("nonce-ttl")
                .help("Challenge nonce lifetime in seconds")
                .default_value("3600")
                .env("TESSERA_NONCE_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("email-code-ttl")
                .long("email-code-ttl")
                .help("One-time email code lifetime in seconds")
                .default_value("900")
                .env("TESSERA_EMAIL_CODE_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("TESSERA_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "tessera");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Second-factor authentication core"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_policy() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "tessera",
            "--port",
            "8443",
            "--issuer",
            "Example Site",
            "--enforcement-policy",
            "all-users",
            "--grace-period",
            "2",
            "--grace-unit",
            "days",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8443));
        assert_eq!(
            matches.get_one::<String>("issuer").map(String::as_str),
            Some("Example Site")
        );
        assert_eq!(
            matches.get_one::<EnforcementPolicy>("enforcement-policy"),
            Some(&EnforcementPolicy::AllUsers)
        );
        assert_eq!(matches.get_one::<u32>("grace-period").copied(), Some(2));
        assert_eq!(
            matches.get_one::<GraceUnit>("grace-unit"),
            Some(&GraceUnit::Days)
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("TESSERA_PORT", Some("443")),
                ("TESSERA_ISSUER", Some("Example")),
                ("TESSERA_ENFORCEMENT_POLICY", Some("certain-roles-only")),
                ("TESSERA_ENFORCED_ROLES", Some("administrator,editor")),
                ("TESSERA_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["tessera"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("issuer").map(String::as_str),
                    Some("Example")
                );
                assert_eq!(
                    matches.get_one::<EnforcementPolicy>("enforcement-policy"),
                    Some(&EnforcementPolicy::CertainRolesOnly)
                );
                assert_eq!(
                    matches
                        .get_one::<String>("enforced-roles")
                        .map(String::as_str),
                    Some("administrator,editor")
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("TESSERA_LOG_LEVEL", Some(level))], || {
                let command = new();
                let matches = command.get_matches_from(vec!["tessera"]);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(u8::try_from(index).unwrap())
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("TESSERA_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["tessera".to_string()];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();
                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(u8::try_from(index).unwrap())
                );
            });
        }
    }

    #[test]
    fn test_invalid_enforcement_policy_rejected() {
        let command = new();
        let result =
            command.try_get_matches_from(vec!["tessera", "--enforcement-policy", "bogus"]);
        assert!(result.is_err());
    }
}
