//! `Reconcile(key)` for Devnet resources.

use std::sync::Arc;

use async_trait::async_trait;
use storage::StorageBackend;

use crate::adapters::Provisioner;
use crate::broadcaster::{LogBroadcaster, ProvisionLogEntry};
use crate::error::ReconcileResult;
use crate::manager::Controller;
use crate::model::{set_condition, Condition, ConditionStatus, Devnet, DevnetPhase, Event, EventType};
use crate::store::Store;

use super::classify::classify_provisioning_error;
use super::key::parse_ns_name;

pub struct DevnetController<B: StorageBackend> {
    store: Arc<Store<B>>,
    provisioner: Option<Arc<dyn Provisioner>>,
    broadcaster: Arc<LogBroadcaster>,
}

impl<B: StorageBackend> DevnetController<B> {
    pub fn new(store: Arc<Store<B>>, provisioner: Option<Arc<dyn Provisioner>>, broadcaster: Arc<LogBroadcaster>) -> Self {
        Self { store, provisioner, broadcaster }
    }

    async fn handle_pending(&self, mut devnet: Devnet) -> ReconcileResult<Devnet> {
        set_condition(
            &mut devnet.status.conditions,
            Condition::new("Progressing", ConditionStatus::True, "ProvisioningStarted", "provisioning has started"),
        );
        set_condition(
            &mut devnet.status.conditions,
            Condition::new("Ready", ConditionStatus::False, "NodesNotReady", "nodes are not ready yet"),
        );
        devnet.status.events.push(Event::new(EventType::Normal, "ProvisioningStarted", "devnet provisioning started"));
        devnet.status.phase = DevnetPhase::Provisioning;
        let devnet = self.store.update_devnet(devnet).await?;
        self.broadcaster.broadcast(
            &devnet.metadata.namespace,
            &devnet.metadata.name,
            ProvisionLogEntry::info("Provisioning", "provisioning started"),
        );
        Ok(devnet)
    }

    async fn handle_provisioning(&self, mut devnet: Devnet) -> ReconcileResult<Devnet> {
        let result = match &self.provisioner {
            Some(provisioner) => provisioner.provision(&devnet).await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                let total = devnet.spec.total_nodes();
                devnet.status.nodes = total;
                devnet.status.ready_nodes = total;
                set_condition(
                    &mut devnet.status.conditions,
                    Condition::new("Progressing", ConditionStatus::False, "ProvisioningComplete", "all nodes created"),
                );
                set_condition(
                    &mut devnet.status.conditions,
                    Condition::new("NodesCreated", ConditionStatus::True, "AllNodesReady", "all nodes created"),
                );
                set_condition(
                    &mut devnet.status.conditions,
                    Condition::new("Ready", ConditionStatus::True, "AllNodesReady", "all nodes are ready"),
                );
                devnet.status.message = "provisioning complete".to_string();
                devnet
                    .status
                    .events
                    .push(Event::new(EventType::Normal, "ProvisioningComplete", "devnet provisioning complete"));
                devnet.status.phase = DevnetPhase::Running;
                self.broadcaster.broadcast(
                    &devnet.metadata.namespace,
                    &devnet.metadata.name,
                    ProvisionLogEntry::info("Provisioning", "provisioning complete"),
                );
            }
            Err(err) => {
                let kind = classify_provisioning_error(&err.to_string());
                set_condition(
                    &mut devnet.status.conditions,
                    Condition::new("Progressing", ConditionStatus::False, kind.reason(), err.to_string()),
                );
                set_condition(
                    &mut devnet.status.conditions,
                    Condition::new("Degraded", ConditionStatus::True, kind.reason(), err.to_string()),
                );
                devnet.status.message = err.to_string();
                devnet.status.events.push(Event::new(EventType::Warning, kind.reason(), err.to_string()));
                devnet.status.phase = DevnetPhase::Degraded;
            }
        }

        let devnet = self.store.update_devnet(devnet).await?;
        Ok(devnet)
    }

    async fn handle_running(&self, mut devnet: Devnet) -> ReconcileResult<Devnet> {
        let status = match &self.provisioner {
            Some(provisioner) => provisioner.get_status(&devnet).await.map_err(anyhow::Error::from)?,
            None => crate::adapters::ProvisionStatus {
                nodes: devnet.status.nodes,
                ready_nodes: devnet.status.nodes,
                current_height: devnet.status.current_height,
            },
        };

        let unchanged = status.ready_nodes >= status.nodes
            && status.ready_nodes == devnet.status.ready_nodes
            && status.current_height == devnet.status.current_height;
        if unchanged {
            // No phase transition and nothing observable moved: skip the
            // write so no watch event fires and this devnet doesn't
            // re-enqueue itself.
            return Ok(devnet);
        }

        if status.ready_nodes < status.nodes {
            devnet.status.ready_nodes = status.ready_nodes;
            devnet.status.phase = DevnetPhase::Degraded;
            set_condition(
                &mut devnet.status.conditions,
                Condition::new("Degraded", ConditionStatus::True, "NodesUnhealthy", "some nodes are not ready"),
            );
        } else {
            devnet.status.current_height = status.current_height;
            devnet.status.ready_nodes = status.ready_nodes;
            devnet.status.last_health_check = Some(chrono::Utc::now());
        }

        let devnet = self.store.update_devnet(devnet).await?;
        Ok(devnet)
    }

    async fn handle_degraded(&self, mut devnet: Devnet) -> ReconcileResult<Devnet> {
        let status = match &self.provisioner {
            Some(provisioner) => provisioner.get_status(&devnet).await.map_err(anyhow::Error::from)?,
            None => crate::adapters::ProvisionStatus {
                nodes: devnet.status.nodes,
                ready_nodes: devnet.status.nodes,
                current_height: devnet.status.current_height,
            },
        };

        let recovered = status.ready_nodes >= status.nodes;
        if !recovered && status.ready_nodes == devnet.status.ready_nodes {
            // Still degraded by the same amount: nothing moved, skip the write.
            return Ok(devnet);
        }

        devnet.status.ready_nodes = status.ready_nodes;
        if recovered {
            devnet.status.phase = DevnetPhase::Running;
            set_condition(
                &mut devnet.status.conditions,
                Condition::new("Degraded", ConditionStatus::False, "Recovered", "all nodes recovered"),
            );
        }

        let devnet = self.store.update_devnet(devnet).await?;
        Ok(devnet)
    }
}

#[async_trait]
impl<B: StorageBackend + Send + Sync + 'static> Controller for DevnetController<B> {
    async fn reconcile(&self, key: &str) -> ReconcileResult<()> {
        let (namespace, name) = parse_ns_name(key);
        let Some(devnet) = self.store.get_devnet(&namespace, &name).await? else {
            return Ok(());
        };

        match devnet.status.phase {
            DevnetPhase::Pending => {
                let devnet = self.handle_pending(devnet).await?;
                self.handle_provisioning(devnet).await?;
            }
            DevnetPhase::Provisioning => {
                self.handle_provisioning(devnet).await?;
            }
            DevnetPhase::Running => {
                self.handle_running(devnet).await?;
            }
            DevnetPhase::Degraded => {
                self.handle_degraded(devnet).await?;
            }
            DevnetPhase::Stopped => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DevnetSpec, Mode};
    use crate::store::new_devnet;
    use storage::MemoryStorage;

    fn make_controller() -> (DevnetController<MemoryStorage>, Arc<Store<MemoryStorage>>) {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let controller = DevnetController::new(store.clone(), None, Arc::new(LogBroadcaster::new()));
        (controller, store)
    }

    #[tokio::test]
    async fn s1_happy_path_reaches_running_in_one_reconcile() {
        let (controller, store) = make_controller();
        let spec = DevnetSpec {
            plugin: "stable".to_string(),
            validators: 4,
            full_nodes: 0,
            mode: Mode::Docker,
            plugin_config: Default::default(),
        };
        let devnet = store.create_devnet(new_devnet("default", "dev1", spec)).await.unwrap();

        controller.reconcile(&format!("default/{}", devnet.metadata.name)).await.unwrap();

        let devnet = store.get_devnet("default", "dev1").await.unwrap().unwrap();
        assert_eq!(devnet.status.phase, DevnetPhase::Running);
        assert_eq!(devnet.status.nodes, 4);
        assert_eq!(devnet.status.ready_nodes, 4);
        let ready = devnet.status.conditions.iter().find(|c| c.type_ == "Ready").unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.reason, "AllNodesReady");
        assert!(devnet.status.events.len() >= 2);
        assert_eq!(devnet.status.events.last().unwrap().reason, "ProvisioningComplete");
    }

    struct FailingProvisioner;

    #[async_trait]
    impl Provisioner for FailingProvisioner {
        async fn provision(&self, _devnet: &Devnet) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("image not found: cosmos/test:latest"))
        }
        async fn deprovision(&self, _devnet: &Devnet) -> anyhow::Result<()> {
            Ok(())
        }
        async fn start(&self, _devnet: &Devnet) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self, _devnet: &Devnet) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_status(&self, _devnet: &Devnet) -> anyhow::Result<crate::adapters::ProvisionStatus> {
            Ok(crate::adapters::ProvisionStatus::default())
        }
    }

    #[tokio::test]
    async fn s2_provisioning_failure_marks_degraded() {
        let store = Arc::new(Store::new(MemoryStorage::new()));
        let controller = DevnetController::new(store.clone(), Some(Arc::new(FailingProvisioner)), Arc::new(LogBroadcaster::new()));
        let spec = DevnetSpec {
            plugin: "stable".to_string(),
            validators: 4,
            full_nodes: 0,
            mode: Mode::Docker,
            plugin_config: Default::default(),
        };
        store.create_devnet(new_devnet("default", "dev1", spec)).await.unwrap();

        controller.reconcile("default/dev1").await.unwrap();

        let devnet = store.get_devnet("default", "dev1").await.unwrap().unwrap();
        assert_eq!(devnet.status.phase, DevnetPhase::Degraded);
        let degraded = devnet.status.conditions.iter().find(|c| c.type_ == "Degraded").unwrap();
        assert_eq!(degraded.reason, "ImageNotFound");
        let warning = devnet.status.events.iter().find(|e| e.type_ == EventType::Warning).unwrap();
        assert_eq!(warning.reason, "ImageNotFound");
    }

    #[tokio::test]
    async fn reconcile_on_missing_devnet_is_a_noop() {
        let (controller, _store) = make_controller();
        controller.reconcile("default/does-not-exist").await.unwrap();
    }
}
