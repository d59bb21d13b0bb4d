//! Manifests
//!
//! Builds the objects scenarios apply as typed `k8s-openapi` values and
//! renders them to YAML for `kubectl apply -f -`.

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::observer::VolumeMode;
use k8s_openapi::api::core::v1::{
    CSIVolumeSource, Container, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements, Volume, VolumeDevice,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;

/// Entry point of the consumer image; sleeps forever
pub const PAUSE_COMMAND: &str = "/usr/local/bin/pause";

/// Render one object as a YAML document
pub fn render<T: Serialize>(object: &T) -> Result<String> {
    Ok(serde_yaml::to_string(object)?)
}

/// Join rendered documents into one multi-document manifest
pub fn join(documents: &[String]) -> String {
    documents.join("---\n")
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn app_labels(app: &str) -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from([(
        "app.kubernetes.io/name".to_string(),
        app.to_string(),
    )]))
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: meta(name),
        ..Default::default()
    }
}

// =============================================================================
// Claims
// =============================================================================

/// ReadWriteOnce claim of `size` (a quantity such as `1Gi`)
pub fn claim(name: &str, size: &str, storage_class: &str, mode: VolumeMode) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(name),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            storage_class_name: Some(storage_class.to_string()),
            volume_mode: match mode {
                VolumeMode::Block => Some(VolumeMode::Block.to_string()),
                VolumeMode::Filesystem => None,
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Pods
// =============================================================================

fn pause_container(config: &HarnessConfig) -> Container {
    Container {
        name: "ubuntu".to_string(),
        image: Some(config.image.clone()),
        command: Some(vec![PAUSE_COMMAND.to_string()]),
        ..Default::default()
    }
}

fn claim_volume(volume: &str, claim: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim.to_string(),
            read_only: None,
        }),
        ..Default::default()
    }
}

fn pod_object(name: &str, app: &str, spec: PodSpec) -> Pod {
    Pod {
        metadata: ObjectMeta {
            labels: app_labels(app),
            ..meta(name)
        },
        spec: Some(spec),
        ..Default::default()
    }
}

/// Pod mounting `claim` at `mount_path`
pub fn pod_with_mount(config: &HarnessConfig, name: &str, claim: &str, mount_path: &str) -> Pod {
    let container = Container {
        volume_mounts: Some(vec![VolumeMount {
            mount_path: mount_path.to_string(),
            name: "my-volume".to_string(),
            ..Default::default()
        }]),
        ..pause_container(config)
    };
    pod_object(
        name,
        "ubuntu",
        PodSpec {
            containers: vec![container],
            volumes: Some(vec![claim_volume("my-volume", claim)]),
            ..Default::default()
        },
    )
}

/// Pod exposing block-mode `claim` as the device `device_path`
pub fn pod_with_device(config: &HarnessConfig, name: &str, claim: &str, device_path: &str) -> Pod {
    let container = Container {
        volume_devices: Some(vec![VolumeDevice {
            device_path: device_path.to_string(),
            name: "my-volume".to_string(),
        }]),
        ..pause_container(config)
    };
    pod_object(
        name,
        "ubuntu",
        PodSpec {
            containers: vec![container],
            volumes: Some(vec![claim_volume("my-volume", claim)]),
            ..Default::default()
        },
    )
}

/// An inline ephemeral CSI volume and where to mount it
#[derive(Debug, Clone)]
pub struct InlineVolume {
    pub name: String,
    pub mount_path: String,
    /// Filesystem; the driver default when `None`
    pub fs_type: Option<String>,
    /// Size in GiB; the driver default when `None`
    pub size_gib: Option<u64>,
}

/// Pod with inline ephemeral volumes provisioned by the CSI driver
pub fn pod_with_inline_volumes(config: &HarnessConfig, name: &str, volumes: &[InlineVolume]) -> Pod {
    let container = Container {
        volume_mounts: Some(
            volumes
                .iter()
                .map(|v| VolumeMount {
                    mount_path: v.mount_path.clone(),
                    name: v.name.clone(),
                    ..Default::default()
                })
                .collect(),
        ),
        ..pause_container(config)
    };
    let volumes = volumes
        .iter()
        .map(|v| Volume {
            name: v.name.clone(),
            csi: Some(CSIVolumeSource {
                driver: config.driver_name.clone(),
                fs_type: v.fs_type.clone(),
                volume_attributes: v.size_gib.map(|size| {
                    BTreeMap::from([(config.inline_size_attribute(), size.to_string())])
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    pod_object(
        name,
        "ubuntu",
        PodSpec {
            containers: vec![container],
            volumes: Some(volumes),
            ..Default::default()
        },
    )
}

/// Pod that asks the scheduler extension for `capacity` bytes
///
/// The request is carried by the device-class capacity annotation; the
/// extended resource makes the pod visible to the extension's webhook.
pub fn capacity_pod(config: &HarnessConfig, name: &str, capacity: u64) -> Pod {
    let one = BTreeMap::from([(config.capacity_resource.clone(), Quantity("1".to_string()))]);
    let container = Container {
        resources: Some(ResourceRequirements {
            requests: Some(one.clone()),
            limits: Some(one),
            ..Default::default()
        }),
        ..pause_container(config)
    };

    let mut pod = pod_object(
        name,
        name,
        PodSpec {
            containers: vec![container],
            ..Default::default()
        },
    );
    pod.metadata.annotations = Some(BTreeMap::from([(
        config.capacity_key(),
        capacity.to_string(),
    )]));
    pod
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn as_value(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_claim_manifest() {
        let yaml = render(&claim("topo-pvc", "1Gi", "topolvm-provisioner", VolumeMode::Block)).unwrap();
        let value = as_value(&yaml);

        assert_eq!(value["kind"], "PersistentVolumeClaim");
        assert_eq!(value["spec"]["resources"]["requests"]["storage"], "1Gi");
        assert_eq!(value["spec"]["volumeMode"], "Block");
        assert_eq!(value["spec"]["accessModes"][0], "ReadWriteOnce");
    }

    #[test]
    fn test_inline_volume_pod() {
        let config = HarnessConfig::default();
        let pod = pod_with_inline_volumes(
            &config,
            "ubuntu",
            &[
                InlineVolume {
                    name: "my-volume".into(),
                    mount_path: "/test1".into(),
                    fs_type: Some("xfs".into()),
                    size_gib: Some(2),
                },
                InlineVolume {
                    name: "my-default-volume".into(),
                    mount_path: "/test2".into(),
                    fs_type: None,
                    size_gib: None,
                },
            ],
        );
        let value = as_value(&render(&pod).unwrap());

        let volumes = &value["spec"]["volumes"];
        assert_eq!(volumes[0]["csi"]["driver"], "topolvm.cybozu.com");
        assert_eq!(volumes[0]["csi"]["volumeAttributes"]["topolvm.cybozu.com/size"], "2");
        assert!(volumes[1]["csi"].get("volumeAttributes").is_none());
        assert_eq!(value["spec"]["containers"][0]["volumeMounts"][1]["mountPath"], "/test2");
    }

    #[test]
    fn test_capacity_pod() {
        let config = HarnessConfig::default();
        let value = as_value(&render(&capacity_pod(&config, "testhttpd", 1 << 30)).unwrap());

        assert_eq!(value["metadata"]["annotations"]["capacity.topolvm.cybozu.com/ssd"], "1073741824");
        assert_eq!(
            value["spec"]["containers"][0]["resources"]["limits"]["topolvm.cybozu.com/capacity"],
            "1"
        );
        assert_eq!(value["metadata"]["labels"]["app.kubernetes.io/name"], "testhttpd");
    }

    #[test]
    fn test_join_documents() {
        let docs = vec![
            render(&namespace("a")).unwrap(),
            render(&namespace("b")).unwrap(),
        ];
        let joined = join(&docs);
        let count = serde_yaml::Deserializer::from_str(&joined).count();
        assert_eq!(count, 2);
    }
}
