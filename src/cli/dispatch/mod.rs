use crate::cli::actions::Action;
use crate::policy::{EnforcementPolicy, GracePolicy, GraceUnit, PolicySettings};
use crate::store::MethodId;
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::collections::BTreeSet;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let settings = settings_from_matches(matches)?;

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        issuer: matches
            .get_one::<String>("issuer")
            .cloned()
            .unwrap_or_else(|| "Tessera".to_string()),
        backup_pepper: matches
            .get_one::<String>("backup-pepper")
            .map(|pepper| SecretString::from(pepper.clone())),
        settings,
    })
}

fn settings_from_matches(matches: &clap::ArgMatches) -> Result<PolicySettings> {
    let enforcement = matches
        .get_one::<EnforcementPolicy>("enforcement-policy")
        .copied()
        .unwrap_or_default();

    let grace_value = matches.get_one::<u32>("grace-period").copied().unwrap_or(0);
    let grace = if grace_value == 0 {
        GracePolicy::NoGracePeriod
    } else {
        GracePolicy::UseGracePeriod {
            value: grace_value,
            unit: matches
                .get_one::<GraceUnit>("grace-unit")
                .copied()
                .unwrap_or(GraceUnit::Days),
        }
    };

    let enabled_methods = match matches.get_one::<String>("enabled-methods") {
        Some(list) => {
            let mut methods = BTreeSet::new();
            for name in split_list(list) {
                let method = MethodId::parse(&name)
                    .ok_or_else(|| anyhow!("invalid method in --enabled-methods: {name}"))?;
                methods.insert(method);
            }
            methods
        }
        None => PolicySettings::default().enabled_methods,
    };

    let defaults = PolicySettings::default();

    Ok(PolicySettings {
        enforcement,
        enforced_roles: string_set(matches, "enforced-roles"),
        enforced_users: string_set(matches, "enforced-users"),
        excluded_roles: string_set(matches, "excluded-roles"),
        excluded_users: string_set(matches, "excluded-users"),
        included_sites: site_set(matches, "included-sites")?,
        excluded_sites: site_set(matches, "excluded-sites")?,
        multisite: matches.get_flag("multisite"),
        exclude_superadmins: matches.get_flag("exclude-superadmins"),
        enforce_superadmins: matches.get_flag("enforce-superadmins"),
        grace,
        enabled_methods,
        limit_attempts: !matches.get_flag("disable-attempt-limit"),
        max_attempts: matches
            .get_one::<u32>("max-attempts")
            .copied()
            .unwrap_or(defaults.max_attempts),
        nonce_ttl_seconds: matches
            .get_one::<i64>("nonce-ttl")
            .copied()
            .unwrap_or(defaults.nonce_ttl_seconds),
        email_code_ttl_seconds: matches
            .get_one::<i64>("email-code-ttl")
            .copied()
            .unwrap_or(defaults.email_code_ttl_seconds),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn string_set(matches: &clap::ArgMatches, name: &str) -> BTreeSet<String> {
    matches
        .get_one::<String>(name)
        .map(|list| split_list(list).into_iter().collect())
        .unwrap_or_default()
}

fn site_set(matches: &clap::ArgMatches, name: &str) -> Result<BTreeSet<u64>> {
    let Some(list) = matches.get_one::<String>(name) else {
        return Ok(BTreeSet::new());
    };
    split_list(list)
        .into_iter()
        .map(|item| {
            item.parse::<u64>()
                .map_err(|_| anyhow!("invalid site id in --{name}: {item}"))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn defaults_map_to_default_settings() {
        let matches = commands::new().get_matches_from(vec!["tessera"]);
        let Action::Server {
            port,
            issuer,
            backup_pepper,
            settings,
        } = handler(&matches).unwrap();

        assert_eq!(port, 8080);
        assert_eq!(issuer, "Tessera");
        assert!(backup_pepper.is_none());
        assert_eq!(settings, PolicySettings::default());
    }

    #[test]
    fn lists_and_flags_populate_settings() {
        let matches = commands::new().get_matches_from(vec![
            "tessera",
            "--enforcement-policy",
            "certain-roles-only",
            "--enforced-roles",
            "administrator, editor",
            "--excluded-users",
            "bot",
            "--included-sites",
            "1,3",
            "--multisite",
            "--enforce-superadmins",
            "--grace-period",
            "48",
            "--grace-unit",
            "hours",
            "--enabled-methods",
            "totp,backup-codes",
            "--max-attempts",
            "3",
            "--disable-attempt-limit",
        ]);
        let Action::Server { settings, .. } = handler(&matches).unwrap();

        assert_eq!(settings.enforcement, EnforcementPolicy::CertainRolesOnly);
        assert!(settings.enforced_roles.contains("administrator"));
        assert!(settings.enforced_roles.contains("editor"));
        assert!(settings.excluded_users.contains("bot"));
        assert_eq!(
            settings.included_sites,
            BTreeSet::from([1, 3])
        );
        assert!(settings.multisite);
        assert!(settings.enforce_superadmins);
        assert_eq!(
            settings.grace,
            GracePolicy::UseGracePeriod {
                value: 48,
                unit: GraceUnit::Hours
            }
        );
        assert!(settings.enabled_methods.contains(&MethodId::Totp));
        assert!(!settings.enabled_methods.contains(&MethodId::Email));
        assert_eq!(settings.max_attempts, 3);
        assert!(!settings.limit_attempts);
    }

    #[test]
    fn invalid_method_list_is_rejected() {
        let matches = commands::new().get_matches_from(vec![
            "tessera",
            "--enabled-methods",
            "totp,carrier-pigeon",
        ]);
        assert!(handler(&matches).is_err());
    }

    #[test]
    fn invalid_site_id_is_rejected() {
        let matches =
            commands::new().get_matches_from(vec!["tessera", "--included-sites", "1,two"]);
        assert!(handler(&matches).is_err());
    }
}
