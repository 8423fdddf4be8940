//! Admission checks for MailhogInstance specs.
//!
//! Rules run in a fixed order and the first violation wins. A rejected spec
//! withholds all child synchronization until it is edited.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::crd::{MailhogInstanceSpec, StorageKind};

/// Paths the container needs for itself: the binary and the settings mount.
#[allow(clippy::expect_used)]
static RESERVED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\/(usr|mailhog)?(\/)?((settings)\/?(files)?|(local)\/?(bin)?\/?(MailHog)?)?$")
        .expect("reserved path pattern compiles")
});

/// A failed admission rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    ReservedMaildirPath,
    IncompleteMongoDb,
    MissingMaildirPath,
    UpstreamWithoutMechanism,
    UnparsableProbability,
    AbsoluteWebPath,
}

impl Violation {
    /// Text written to `status.error`.
    pub fn message(&self) -> &'static str {
        match self {
            Violation::ReservedMaildirPath => {
                "the chosen maildir path conflicts with other paths needed (/usr/local/bin or /mailhog/settings/files)"
            }
            Violation::IncompleteMongoDb => {
                "mongodb was specified as data storage but not all mongodb params have been specified"
            }
            Violation::MissingMaildirPath => {
                "maildir was specified as data storage but no path has been specified"
            }
            Violation::UpstreamWithoutMechanism => {
                "an upstream smtp server has username / password specified but no auth mechanism"
            }
            Violation::UnparsableProbability => {
                "a chaos monkey probability rate cannot be unpacked as a float"
            }
            Violation::AbsoluteWebPath => {
                "web path must be relative (not starting or ending with slash)"
            }
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

type Rule = fn(&MailhogInstanceSpec) -> Option<Violation>;

const RULES: [Rule; 5] = [
    reserved_maildir_path,
    storage_settings,
    upstream_mechanism,
    jim_probabilities,
    relative_web_path,
];

/// Return the first violated rule, or `None` when the spec is admissible.
pub fn validate_spec(spec: &MailhogInstanceSpec) -> Option<Violation> {
    RULES.iter().find_map(|rule| rule(spec))
}

fn reserved_maildir_path(spec: &MailhogInstanceSpec) -> Option<Violation> {
    let path = spec.settings.storage_maildir.path.as_str();
    if path.is_empty() {
        return None;
    }
    RESERVED_PATH
        .is_match(path)
        .then_some(Violation::ReservedMaildirPath)
}

fn storage_settings(spec: &MailhogInstanceSpec) -> Option<Violation> {
    let settings = &spec.settings;
    match settings.storage {
        StorageKind::Mongodb => {
            let mongo = &settings.storage_mongo_db;
            let incomplete =
                mongo.uri.is_empty() || mongo.db.is_empty() || mongo.collection.is_empty();
            incomplete.then_some(Violation::IncompleteMongoDb)
        }
        StorageKind::Maildir => settings
            .storage_maildir
            .path
            .is_empty()
            .then_some(Violation::MissingMaildirPath),
        StorageKind::Memory => None,
    }
}

fn upstream_mechanism(spec: &MailhogInstanceSpec) -> Option<Violation> {
    let files = spec.settings.files.as_ref()?;
    files
        .smtp_upstreams
        .iter()
        .any(|u| (!u.username.is_empty() || !u.password.is_empty()) && u.mechanism.is_empty())
        .then_some(Violation::UpstreamWithoutMechanism)
}

fn jim_probabilities(spec: &MailhogInstanceSpec) -> Option<Violation> {
    let jim = &spec.settings.jim;
    if !jim.invite {
        return None;
    }
    jim.probabilities()
        .iter()
        .any(|raw| !raw.is_empty() && raw.parse::<f64>().is_err())
        .then_some(Violation::UnparsableProbability)
}

fn relative_web_path(spec: &MailhogInstanceSpec) -> Option<Violation> {
    let path = spec.settings.web_path.as_str();
    (path.starts_with('/') || path.ends_with('/')).then_some(Violation::AbsoluteWebPath)
}
