//! Process-wide configuration, read once from the environment at startup.
//!
//! Every collector and publisher receives its slice of `AppConfig` by
//! reference; no component reads ambient process state directly. A source or
//! target whose variables are absent is simply `None` here, which downstream
//! code treats as a deliberate skip.

use tracing::{info, warn};

use crate::identifiers::EnterpriseIdentifiers;

const DEFAULT_IMAP_PORT: u16 = 993;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mail: Option<MailConfig>,
    pub sms: Option<SmsConfig>,
    pub mdm: Option<MdmConfig>,
    pub publish: PublishTargets,
    pub enterprise: EnterpriseIdentifiers,
    pub archive: Option<ArchiveConfig>,
}

/// IMAP mailbox credentials for the mail collector.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

/// SMS provider credentials plus the configured numbers to poll.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub sid: String,
    pub token: String,
    pub numbers: Vec<String>,
}

/// Device-inventory (MDM) API location.
#[derive(Debug, Clone)]
pub struct MdmConfig {
    pub url: String,
    pub key: String,
}

/// One outbound publish target: endpoint URL plus bearer key.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub key: String,
}

/// The three procurement/registration systems reports are published to.
/// A target missing either value is never attempted.
#[derive(Debug, Clone, Default)]
pub struct PublishTargets {
    pub coupa: Option<Endpoint>,
    pub piee: Option<Endpoint>,
    pub sam: Option<Endpoint>,
}

/// Optional best-effort archive upload of the collection index.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub url: String,
    pub key: String,
}

impl AppConfig {
    /// Assemble the full configuration from the environment. Absent or empty
    /// variables leave the corresponding section unconfigured rather than
    /// erroring; validation of required identifiers happens at the gate.
    pub fn from_env() -> Self {
        let mail = match (var("IMAP_HOST"), var("IMAP_USER"), var("IMAP_PASSWORD")) {
            (Some(host), Some(user), Some(password)) => Some(MailConfig {
                host,
                user,
                password,
                port: imap_port(),
            }),
            _ => None,
        };

        let sms = match (var("TWILIO_SID"), var("TWILIO_TOKEN")) {
            (Some(sid), Some(token)) => Some(SmsConfig {
                sid,
                token,
                numbers: phone_numbers(),
            }),
            _ => None,
        };

        let mdm = match (var("APPLE_MDM_API_URL"), var("APPLE_MDM_API_KEY")) {
            (Some(url), Some(key)) => Some(MdmConfig { url, key }),
            _ => None,
        };

        let publish = PublishTargets {
            coupa: endpoint("COUPA_API_URL", "COUPA_API_KEY"),
            piee: endpoint("PIEE_API_URL", "PIEE_API_KEY"),
            sam: endpoint("SAM_API_URL", "SAM_API_KEY"),
        };

        let enterprise = EnterpriseIdentifiers {
            uei: var_or_empty("UEI"),
            cage: var_or_empty("CAGE_CODE"),
            dodaac_contracting: var_or_empty("DODAAC_CONTRACTING"),
            dodaac_funding: var_or_empty("DODAAC_FUNDING"),
            paying_dodaac: var_or_empty("PAYING_DODAAC"),
            fedstrip: var_or_empty("FEDSTRIP"),
            finance_unitid: var_or_empty("FINANCE_UNITID"),
            cag_code: var_or_empty("CAG_CODE"),
            ba_codes: var_or_empty("BA_CODES"),
            scf_code: var_or_empty("SCF_CODE"),
            district_cd: var_or_empty("DISTRICT_CD"),
            eps: var_or_empty("EPS"),
        };

        let archive = match (var("CLOUD_ARCHIVE_URL"), var("CLOUD_ARCHIVE_KEY")) {
            (Some(url), Some(key)) => Some(ArchiveConfig { url, key }),
            _ => None,
        };

        AppConfig {
            mail,
            sms,
            mdm,
            publish,
            enterprise,
            archive,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            mail = self.mail.is_some(),
            sms = self.sms.is_some(),
            mdm = self.mdm.is_some(),
            coupa = self.publish.coupa.is_some(),
            piee = self.publish.piee.is_some(),
            sam = self.publish.sam.is_some(),
            archive = self.archive.is_some(),
            "Loaded configuration from environment"
        );
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or_empty(name: &str) -> String {
    var(name).unwrap_or_default()
}

fn endpoint(url_var: &str, key_var: &str) -> Option<Endpoint> {
    match (var(url_var), var(key_var)) {
        (Some(url), Some(key)) => Some(Endpoint { url, key }),
        _ => None,
    }
}

fn imap_port() -> u16 {
    match var("IMAP_PORT") {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(raw = %raw, "IMAP_PORT is not a valid port number, using default");
            DEFAULT_IMAP_PORT
        }),
        None => DEFAULT_IMAP_PORT,
    }
}

fn phone_numbers() -> Vec<String> {
    var("PHONE_NUMBERS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_all() {
        for name in [
            "IMAP_HOST",
            "IMAP_USER",
            "IMAP_PASSWORD",
            "IMAP_PORT",
            "TWILIO_SID",
            "TWILIO_TOKEN",
            "PHONE_NUMBERS",
            "APPLE_MDM_API_URL",
            "APPLE_MDM_API_KEY",
            "COUPA_API_URL",
            "COUPA_API_KEY",
            "PIEE_API_URL",
            "PIEE_API_KEY",
            "SAM_API_URL",
            "SAM_API_KEY",
            "CLOUD_ARCHIVE_URL",
            "CLOUD_ARCHIVE_KEY",
            "UEI",
            "CAGE_CODE",
            "DODAAC_CONTRACTING",
            "DODAAC_FUNDING",
            "PAYING_DODAAC",
            "FEDSTRIP",
            "FINANCE_UNITID",
            "CAG_CODE",
            "BA_CODES",
            "SCF_CODE",
            "DISTRICT_CD",
            "EPS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn absent_sections_are_unconfigured() {
        clear_all();
        let config = AppConfig::from_env();
        assert!(config.mail.is_none());
        assert!(config.sms.is_none());
        assert!(config.mdm.is_none());
        assert!(config.publish.coupa.is_none());
        assert!(config.archive.is_none());
        assert!(config.enterprise.uei.is_empty());
    }

    #[test]
    #[serial]
    fn partial_credentials_do_not_configure_a_section() {
        clear_all();
        std::env::set_var("COUPA_API_URL", "https://coupa.example.com/report");
        let config = AppConfig::from_env();
        assert!(
            config.publish.coupa.is_none(),
            "URL without key must stay unconfigured"
        );
    }

    #[test]
    #[serial]
    fn mail_section_defaults_the_port() {
        clear_all();
        std::env::set_var("IMAP_HOST", "imap.example.com");
        std::env::set_var("IMAP_USER", "auditor");
        std::env::set_var("IMAP_PASSWORD", "secret");
        let config = AppConfig::from_env();
        let mail = config.mail.expect("mail configured");
        assert_eq!(mail.port, DEFAULT_IMAP_PORT);
    }

    #[test]
    #[serial]
    fn phone_numbers_are_trimmed_and_filtered() {
        clear_all();
        std::env::set_var("TWILIO_SID", "AC123");
        std::env::set_var("TWILIO_TOKEN", "tok");
        std::env::set_var("PHONE_NUMBERS", " 5551234 ,, 5555678");
        let config = AppConfig::from_env();
        let sms = config.sms.expect("sms configured");
        assert_eq!(sms.numbers, vec!["5551234", "5555678"]);
    }
}
