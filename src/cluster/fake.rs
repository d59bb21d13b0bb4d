//! In-memory cluster for unit tests
//!
//! Objects are stored as JSON documents keyed by kind, namespace and name.
//! Each key holds a queue of snapshots: a read pops the front snapshot while
//! more than one remains, so a test can script an object converging over
//! successive polls. Exec results and LVM listings are scripted the same way.

use super::{CommandOutput, ControlPlane, OutputFormat, Query, Target, VolumeManager};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

type Key = (String, String, String);

/// Scripted stand-in for both the control plane and the LVM host
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<Key, VecDeque<Value>>>,
    execs: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    lv_names: Mutex<VecDeque<Vec<String>>>,
    applied: Mutex<Vec<Value>>,
    deleted: Mutex<Vec<String>>,
    exec_log: Mutex<Vec<String>>,
    on_apply: Mutex<Vec<(usize, Key, Value)>>,
    converged: Mutex<HashMap<Key, Value>>,
}

fn canonical_kind(kind: &str) -> String {
    match kind.to_lowercase().as_str() {
        "pod" | "pods" => "pods",
        "pvc" | "persistentvolumeclaim" | "persistentvolumeclaims" => "pvc",
        "pv" | "persistentvolume" | "persistentvolumes" => "pv",
        "node" | "nodes" => "nodes",
        "logicalvolume" | "logicalvolumes" => "logicalvolumes",
        "event" | "events" => "events",
        "sa" | "serviceaccount" | "serviceaccounts" => "sa",
        "namespace" | "namespaces" => "namespaces",
        other => return other.to_string(),
    }
    .to_string()
}

fn cluster_scoped(kind: &str) -> bool {
    matches!(kind, "nodes" | "pv" | "namespaces" | "logicalvolumes")
}

fn key(kind: &str, namespace: Option<&str>, name: &str) -> Key {
    let kind = canonical_kind(kind);
    let ns = if cluster_scoped(&kind) {
        String::new()
    } else {
        namespace.unwrap_or_default().to_string()
    };
    (kind, ns, name.to_string())
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(value, |v, p| v.get(p))
}

fn render_template(value: &Value, template: &str) -> String {
    let path = template
        .trim()
        .trim_start_matches("{{")
        .trim_end_matches("}}")
        .trim();
    match lookup(value, path) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<no value>".to_string(),
    }
}

fn selector_matches(value: &Value, selector: &str, base: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let (k, v) = term.split_once('=').unwrap_or((term, ""));
        let found = if base.is_empty() {
            lookup(value, k)
        } else {
            lookup(value, base).and_then(|labels| labels.get(k))
        };
        found.and_then(Value::as_str) == Some(v)
    })
}

impl FakeCluster {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// Store a single snapshot for an object, replacing any script
    pub fn put(&self, kind: &str, namespace: Option<&str>, name: &str, value: Value) {
        self.put_sequence(kind, namespace, name, vec![value]);
    }

    /// Script the snapshots successive reads of an object return
    pub fn put_sequence(&self, kind: &str, namespace: Option<&str>, name: &str, values: Vec<Value>) {
        self.objects
            .lock()
            .insert(key(kind, namespace, name), values.into_iter().collect());
    }

    pub fn contains(&self, kind: &str, namespace: Option<&str>, name: &str) -> bool {
        self.objects.lock().contains_key(&key(kind, namespace, name))
    }

    /// Make an object appear once the next manifest is applied
    pub fn on_apply(&self, kind: &str, namespace: Option<&str>, name: &str, value: Value) {
        self.on_nth_apply(1, kind, namespace, name, value);
    }

    /// Make an object appear once `n` more manifests have been applied
    pub fn on_nth_apply(&self, n: usize, kind: &str, namespace: Option<&str>, name: &str, value: Value) {
        self.on_apply
            .lock()
            .push((n, key(kind, namespace, name), value));
    }

    /// Store `value` instead of the document whenever this object is applied,
    /// standing in for the controllers that fill in spec and status
    pub fn converge_to(&self, kind: &str, namespace: Option<&str>, name: &str, value: Value) {
        self.converged
            .lock()
            .insert(key(kind, namespace, name), value);
    }

    /// Script the outputs of a command run inside `pod`
    pub fn script_exec(&self, pod: &str, command: &[&str], outputs: Vec<CommandOutput>) {
        self.execs
            .lock()
            .insert(format!("{} {}", pod, command.join(" ")), outputs.into_iter().collect());
    }

    /// Script successive `lvs` listings
    pub fn script_lvs(&self, listings: Vec<Vec<&str>>) {
        *self.lv_names.lock() = listings
            .into_iter()
            .map(|names| names.into_iter().map(str::to_string).collect())
            .collect();
    }

    /// Manifests applied so far, one entry per document
    pub fn applied(&self) -> Vec<Value> {
        self.applied.lock().clone()
    }

    /// `kind/name` of every delete so far
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    /// Commands executed inside pods so far
    pub fn exec_log(&self) -> Vec<String> {
        self.exec_log.lock().clone()
    }

    fn snapshot(&self, k: &Key) -> Option<Value> {
        let mut objects = self.objects.lock();
        let queue = objects.get_mut(k)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn list(&self, kind: &str, namespace: Option<&str>) -> Vec<Value> {
        let kind = canonical_kind(kind);
        let keys: Vec<Key> = self
            .objects
            .lock()
            .keys()
            .filter(|(k, ns, _)| {
                *k == kind
                    && (cluster_scoped(&kind)
                        || namespace.map_or(true, |wanted| ns.as_str() == wanted))
            })
            .cloned()
            .collect();
        keys.iter().filter_map(|k| self.snapshot(k)).collect()
    }

    fn documents(manifest: &str) -> Result<Vec<Value>> {
        let mut docs = Vec::new();
        for document in serde_yaml::Deserializer::from_str(manifest) {
            let value = <Value as serde::Deserialize>::deserialize(document)?;
            if !value.is_null() {
                docs.push(value);
            }
        }
        Ok(docs)
    }

    fn doc_key(doc: &Value, namespace: Option<&str>) -> Key {
        let kind = doc["kind"].as_str().unwrap_or_default();
        let name = doc["metadata"]["name"].as_str().unwrap_or_default();
        let ns = doc["metadata"]["namespace"].as_str().or(namespace);
        key(kind, ns, name)
    }
}

#[async_trait]
impl ControlPlane for FakeCluster {
    async fn apply(&self, namespace: Option<&str>, manifest: &str) -> Result<CommandOutput> {
        for doc in Self::documents(manifest)? {
            let k = Self::doc_key(&doc, namespace);
            if k.0 == "namespaces" {
                // the service account controller's job
                let sa = json!({ "metadata": { "name": "default", "namespace": k.2 } });
                self.objects
                    .lock()
                    .insert(key("sa", Some(&k.2), "default"), VecDeque::from(vec![sa]));
            }
            let converged = self.converged.lock().get(&k).cloned();
            let mut objects = self.objects.lock();
            match converged {
                Some(value) => {
                    objects.insert(k, VecDeque::from(vec![value]));
                }
                None => {
                    objects
                        .entry(k)
                        .or_insert_with(|| VecDeque::from(vec![doc.clone()]));
                }
            }
            drop(objects);
            self.applied.lock().push(doc);
        }
        let mut triggered = Vec::new();
        self.on_apply.lock().retain_mut(|(remaining, k, value)| {
            *remaining -= 1;
            if *remaining == 0 {
                triggered.push((k.clone(), value.clone()));
            }
            *remaining > 0
        });
        let mut objects = self.objects.lock();
        for (k, value) in triggered {
            objects.insert(k, VecDeque::from(vec![value]));
        }
        Ok(CommandOutput::ok("configured"))
    }

    async fn delete_manifest(
        &self,
        namespace: Option<&str>,
        manifest: &str,
    ) -> Result<CommandOutput> {
        for doc in Self::documents(manifest)? {
            let k = Self::doc_key(&doc, namespace);
            self.objects.lock().remove(&k);
            self.deleted.lock().push(format!("{}/{}", k.0, k.2));
        }
        Ok(CommandOutput::ok("deleted"))
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        kind: &str,
        target: &Target,
    ) -> Result<CommandOutput> {
        let kind = canonical_kind(kind);
        match target {
            Target::Name(name) => {
                self.objects.lock().remove(&key(&kind, namespace, name));
                self.deleted.lock().push(format!("{}/{}", kind, name));
            }
            Target::Labels(selector) => {
                for item in self.list(&kind, namespace) {
                    if selector_matches(&item, selector, "metadata.labels") {
                        let name = item["metadata"]["name"].as_str().unwrap_or_default();
                        self.objects.lock().remove(&key(&kind, namespace, name));
                        self.deleted.lock().push(format!("{}/{}", kind, name));
                    }
                }
            }
            Target::All => {
                self.deleted.lock().push(format!("{}/*", kind));
            }
        }
        Ok(CommandOutput::ok("deleted"))
    }

    async fn get(&self, query: &Query, output: &OutputFormat) -> Result<String> {
        let value = match &query.target {
            Target::Name(name) => {
                let k = key(&query.kind, query.namespace.as_deref(), name);
                match self.snapshot(&k) {
                    Some(value) => value,
                    None if query.ignore_not_found => return Ok(String::new()),
                    None => {
                        return Err(Error::pending(format!(
                            "Error from server (NotFound): {} \"{}\" not found",
                            query.kind, name
                        )))
                    }
                }
            }
            Target::Labels(selector) => {
                let items: Vec<Value> = self
                    .list(&query.kind, query.namespace.as_deref())
                    .into_iter()
                    .filter(|item| selector_matches(item, selector, "metadata.labels"))
                    .collect();
                json!({ "kind": "List", "items": items })
            }
            Target::All => {
                let items: Vec<Value> = self
                    .list(&query.kind, query.namespace.as_deref())
                    .into_iter()
                    .filter(|item| {
                        query
                            .field_selector
                            .as_deref()
                            .map_or(true, |fs| selector_matches(item, fs, ""))
                    })
                    .collect();
                json!({ "kind": "List", "items": items })
            }
        };

        Ok(match output {
            OutputFormat::Json => value.to_string(),
            OutputFormat::Template(template) => render_template(&value, template),
            OutputFormat::Table => format!(
                "NAME\n{}\n",
                value["metadata"]["name"].as_str().unwrap_or_default()
            ),
        })
    }

    async fn exec(&self, _namespace: &str, pod: &str, command: &[&str]) -> Result<CommandOutput> {
        let script_key = format!("{} {}", pod, command.join(" "));
        self.exec_log.lock().push(script_key.clone());

        let mut execs = self.execs.lock();
        let output = match execs.get_mut(&script_key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| {
            CommandOutput::failed(1, format!("error: container not found ({})", pod))
        }))
    }
}

#[async_trait]
impl VolumeManager for FakeCluster {
    async fn display(&self, lv_name: &str) -> Result<String> {
        let names = self.list_names().await?;
        if names.iter().any(|n| n == lv_name) {
            Ok(format!("  --- Logical volume ---\n  LV Name                {}\n", lv_name))
        } else {
            Ok(String::new())
        }
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let mut listings = self.lv_names.lock();
        Ok(if listings.len() > 1 {
            listings.pop_front().unwrap_or_default()
        } else {
            listings.front().cloned().unwrap_or_default()
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Worker node with an optional free-capacity annotation for `ssd`
pub fn node(name: &str, capacity: Option<u64>) -> Value {
    let mut annotations = serde_json::Map::new();
    if let Some(capacity) = capacity {
        annotations.insert(
            "capacity.topolvm.cybozu.com/ssd".to_string(),
            Value::String(capacity.to_string()),
        );
    }
    json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": { "name": name, "annotations": annotations },
    })
}

/// Claim, bound when `volume_name` is given
pub fn claim(namespace: &str, name: &str, size: &str, volume_name: Option<&str>) -> Value {
    let mut spec = json!({
        "accessModes": ["ReadWriteOnce"],
        "resources": { "requests": { "storage": size } },
        "storageClassName": "topolvm-provisioner",
    });
    if let Some(volume) = volume_name {
        spec["volumeName"] = Value::String(volume.to_string());
    }
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": name, "namespace": namespace },
        "spec": spec,
    })
}

/// Pod, assigned to `node_name` when given, with `(type, status)` conditions
pub fn pod(namespace: &str, name: &str, node_name: Option<&str>, conditions: &[(&str, &str)]) -> Value {
    let conditions: Vec<Value> = conditions
        .iter()
        .map(|(t, s)| json!({ "type": t, "status": s }))
        .collect();
    let mut spec = json!({ "containers": [{ "name": "ubuntu", "image": "ubuntu" }] });
    if let Some(node) = node_name {
        spec["nodeName"] = Value::String(node.to_string());
    }
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app.kubernetes.io/name": name },
        },
        "spec": spec,
        "status": { "conditions": conditions },
    })
}

/// LogicalVolume record placed on `node_name`
pub fn logical_volume(name: &str, node_name: &str, uid: &str) -> Value {
    json!({
        "apiVersion": "topolvm.cybozu.com/v1",
        "kind": "LogicalVolume",
        "metadata": { "name": name, "uid": uid },
        "spec": { "name": name, "nodeName": node_name, "size": "1Gi" },
    })
}

/// Event about `kind/name` with `reason`
pub fn event(namespace: &str, name: &str, kind: &str, object: &str, reason: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Event",
        "metadata": { "name": name, "namespace": namespace },
        "involvedObject": { "kind": kind, "name": object, "namespace": namespace },
        "reason": reason,
        "message": "resize failed",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequences_advance_then_stick() {
        let fake = FakeCluster::new();
        fake.put_sequence(
            "pvc",
            Some("ns"),
            "topo-pvc",
            vec![claim("ns", "topo-pvc", "1Gi", None), claim("ns", "topo-pvc", "1Gi", Some("pvc-1"))],
        );

        let query = Query::named("pvc", "topo-pvc").in_namespace("ns");
        let template = OutputFormat::Template("{{.spec.volumeName}}".into());
        assert_eq!(fake.get(&query, &template).await.unwrap(), "<no value>");
        assert_eq!(fake.get(&query, &template).await.unwrap(), "pvc-1");
        assert_eq!(fake.get(&query, &template).await.unwrap(), "pvc-1");
    }

    #[tokio::test]
    async fn test_field_selector_filters_events() {
        let fake = FakeCluster::new();
        fake.put("events", Some("ns"), "e1", event("ns", "e1", "PersistentVolumeClaim", "topo-pvc", "VolumeResizeFailed"));
        fake.put("events", Some("ns"), "e2", event("ns", "e2", "Pod", "ubuntu", "Scheduled"));

        let query = Query::all("events")
            .in_namespace("ns")
            .with_field_selector("involvedObject.kind=PersistentVolumeClaim,reason=VolumeResizeFailed");
        let body: Value = serde_json::from_str(&fake.get(&query, &OutputFormat::Json).await.unwrap()).unwrap();
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }
}
