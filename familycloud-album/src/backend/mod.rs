pub mod drime;
pub mod local;

use std::sync::Arc;

use crate::config::AlbumConfig;
use crate::drime::DrimeClient;
use crate::slots::SlotStore;

use self::drime::DrimeAdapter;
use self::local::LocalAdapter;

/// Construct the remote adapter from the `[remote]` config section.
///
/// Returns `None` for local-only deployments.
pub fn remote_from_config(config: &AlbumConfig) -> Option<DrimeAdapter> {
    let remote = config.remote.as_ref()?;
    let client = DrimeClient::new(&remote.api_base_url, &remote.access_token)
        .with_paths(remote.paths.clone());
    Some(DrimeAdapter::new(
        client,
        &remote.root_folder,
        remote.max_file_size,
        &config.user,
    ))
}

pub fn local_from_config(config: &AlbumConfig, store: Arc<dyn SlotStore>) -> LocalAdapter {
    LocalAdapter::new(store, config.local.max_file_size, config.local.capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::MemorySlotStore;
    use familycloud_common::backend::PhotoBackend;
    use familycloud_common::documents::BackendKind;

    fn config(toml_str: &str) -> AlbumConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_local_only_has_no_remote() {
        let config = config("data_dir = \"/tmp/album\"\n");
        assert!(remote_from_config(&config).is_none());
        let local = local_from_config(&config, Arc::new(MemorySlotStore::new()));
        assert_eq!(local.kind(), BackendKind::Local);
        assert_eq!(local.max_file_size(), crate::config::DEFAULT_LOCAL_MAX_FILE_SIZE);
    }

    #[test]
    fn test_remote_adapter_from_config() {
        let config = config(
            r#"
data_dir = "/tmp/album"

[remote]
api_base_url = "https://api.drime.cloud/v1/"
access_token = "t"
max_file_size = 2048
"#,
        );
        let remote = remote_from_config(&config).unwrap();
        assert_eq!(remote.kind(), BackendKind::Remote);
        assert_eq!(remote.max_file_size(), 2048);
        assert!(!remote.session().ready);
    }
}
