//! Kubernetes pod subscription backed by `kube::runtime::watcher`.

use async_trait::async_trait;
use futures_util::future;
use futures_util::StreamExt;
use imagewatch_core::{ClusterTarget, Workload, WorkloadEvent};
use k8s_openapi::api::core::v1::Pod;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Config};

use crate::observer::{WatchError, WorkloadStream, WorkloadSubscriber};

/// Watches pods in all namespaces of a cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeSubscriber;

impl KubeSubscriber {
    /// Build a client from the target's kubeconfig path and context.
    pub async fn client_for(target: &ClusterTarget) -> Result<Client, WatchError> {
        let kubeconfig = Kubeconfig::read_from(&target.kubeconfig)
            .map_err(|e| WatchError::Kubeconfig(format!("{}: {}", target.kubeconfig.display(), e)))?;

        let options = KubeConfigOptions {
            context: target.context.clone(),
            ..KubeConfigOptions::default()
        };

        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| WatchError::Kubeconfig(e.to_string()))?;

        Client::try_from(config).map_err(|e| WatchError::Client(e.to_string()))
    }
}

#[async_trait]
impl WorkloadSubscriber for KubeSubscriber {
    async fn subscribe(&self, target: &ClusterTarget) -> Result<WorkloadStream, WatchError> {
        let client = Self::client_for(target).await?;
        let pods: Api<Pod> = Api::all(client);

        let stream = watcher::watcher(pods, watcher::Config::default())
            .default_backoff()
            .filter_map(|event| future::ready(translate(event)))
            .boxed();

        Ok(stream)
    }
}

/// Map a watcher event onto a workload event.
///
/// Pods listed during the initial (or any re-) list are creates; changes
/// seen afterwards are updates. The list-start marker carries nothing.
fn translate(event: Result<Event<Pod>, watcher::Error>) -> Option<Result<WorkloadEvent, WatchError>> {
    match event {
        Ok(Event::Init) => None,
        Ok(Event::InitApply(pod)) => Some(Ok(WorkloadEvent::Created(workload_from_pod(&pod)))),
        Ok(Event::InitDone) => Some(Ok(WorkloadEvent::Synced)),
        Ok(Event::Apply(pod)) => Some(Ok(WorkloadEvent::Updated(workload_from_pod(&pod)))),
        Ok(Event::Delete(pod)) => Some(Ok(WorkloadEvent::Deleted(workload_from_pod(&pod)))),
        Err(e) => Some(Err(WatchError::Watch(e.to_string()))),
    }
}

/// Images of the pod's regular containers.
fn workload_from_pod(pod: &Pod) -> Workload {
    let images = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .filter_map(|c| c.image.clone())
                .collect()
        })
        .unwrap_or_default();

    Workload {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        images,
    }
}
