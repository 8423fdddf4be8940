//! Settings-file ConfigMap, mounted at `/mailhog/settings/files`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::crd::{FilesSpec, MailhogInstance};
use crate::resources::common::{UPSTREAMS_FILE, USERS_FILE, object_meta};

/// Generate the settings ConfigMap for a MailhogInstance.
///
/// Returns `Ok(None)` when no settings files are configured.
pub fn generate_configmap(resource: &MailhogInstance) -> serde_json::Result<Option<ConfigMap>> {
    let Some(files) = resource.spec.settings.files.as_ref() else {
        return Ok(None);
    };

    Ok(Some(ConfigMap {
        metadata: object_meta(resource),
        immutable: Some(false),
        data: Some(settings_files(files)?),
        ..Default::default()
    }))
}

/// File name to content for every configured settings file.
pub fn settings_files(files: &FilesSpec) -> serde_json::Result<BTreeMap<String, String>> {
    let mut data = BTreeMap::new();

    if !files.smtp_upstreams.is_empty() {
        let servers = files
            .smtp_upstreams
            .iter()
            .map(|server| Ok((server.name.clone(), serde_json::to_value(server)?)))
            .collect::<serde_json::Result<serde_json::Map<_, _>>>()?;
        data.insert(
            UPSTREAMS_FILE.to_string(),
            serde_json::to_string(&servers)?,
        );
    }

    if !files.web_users.is_empty() {
        let users: String = files
            .web_users
            .iter()
            .map(|user| format!("{}:{}\n", user.name, user.password_hash))
            .collect();
        data.insert(USERS_FILE.to_string(), users);
    }

    Ok(data)
}
