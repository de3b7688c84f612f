//! Crash-safety check for the sled-backed store: a devnet created and then
//! mutated must still be readable, at its latest committed generation,
//! after the backend is dropped and reopened against the same directory.
//! A process kill at any point must leave the store consistent on restart.

use devnetd::model::{DevnetSpec, Mode};
use devnetd::store::{new_devnet, Store};
use storage::SledStorage;

#[tokio::test]
async fn devnet_survives_backend_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_str().unwrap().to_string();

    {
        let backend = SledStorage::new(&path).expect("open sled store");
        let store = Store::new(backend);
        let spec = DevnetSpec {
            plugin: "stable".to_string(),
            validators: 3,
            full_nodes: 1,
            mode: Mode::Docker,
            plugin_config: Default::default(),
        };
        let devnet = store.create_devnet(new_devnet("default", "dev1", spec)).await.unwrap();
        assert_eq!(devnet.metadata.generation, 1);

        let mut devnet = devnet;
        devnet.status.message = "provisioning".to_string();
        store.update_devnet(devnet).await.unwrap();
    }

    // Reopen the same directory as a fresh process would after a restart.
    let backend = SledStorage::new(&path).expect("reopen sled store");
    let store = Store::new(backend);
    let devnet = store.get_devnet("default", "dev1").await.unwrap().expect("devnet persisted across restart");
    assert_eq!(devnet.metadata.generation, 2);
    assert_eq!(devnet.status.message, "provisioning");
}
