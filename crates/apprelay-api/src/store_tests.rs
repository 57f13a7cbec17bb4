use super::*;

use std::collections::BTreeMap;
use std::sync::Mutex;

use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::WatchEvent;
use kube::core::ErrorResponse;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use apprelay_common::{ApplicationConfig, ChartConfig, ReleaseConfig, SourceRef};

use crate::backend::{MockReleaseClient, ReleaseList};
use crate::watch::ApplicationEvent;

// ========================================================================
// Fixtures
// ========================================================================

fn definition() -> ResourceDefinition {
    ResourceDefinition {
        application: ApplicationConfig {
            kind: "MyApp".to_string(),
            singular: "myapp".to_string(),
            plural: "myapps".to_string(),
            short_names: vec![],
        },
        release: ReleaseConfig {
            prefix: "myapp-".to_string(),
            labels: BTreeMap::from([(
                "apps.cozystack.io/application.kind".to_string(),
                "MyApp".to_string(),
            )]),
            chart: ChartConfig {
                name: "myapp".to_string(),
                source_ref: SourceRef {
                    kind: "Repo".to_string(),
                    name: "r".to_string(),
                    namespace: "ns".to_string(),
                },
            },
        },
    }
}

fn release(name: &str, chart: &str, revision: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "helm.toolkit.fluxcd.io/v2",
        "kind": "HelmRelease",
        "metadata": {
            "name": name,
            "namespace": "tenant-a",
            "resourceVersion": "10",
            "labels": {"team": "db"}
        },
        "spec": {
            "interval": "5m",
            "chart": {"spec": {
                "chart": chart,
                "version": "1.0.0",
                "sourceRef": {"kind": "Repo", "name": "r", "namespace": "ns"}
            }},
            "values": {"replicas": 1}
        },
        "status": {"lastAttemptedRevision": revision}
    }))
    .unwrap()
}

fn not_found(name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("helmreleases.helm.toolkit.fluxcd.io \"{}\" not found", name),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

fn application(name: &str) -> Application {
    Application {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(json!({"replicas": 2})),
        app_version: "1.2.0".to_string(),
        ..Default::default()
    }
}

fn store(mock: MockReleaseClient) -> ApplicationStore {
    ApplicationStore::new(definition(), Arc::new(mock))
}

fn ctx() -> RequestContext {
    RequestContext::namespaced("tenant-a")
}

/// Records objects written to the backing client
#[derive(Clone, Default)]
struct WriteCapture {
    objects: Arc<Mutex<Vec<DynamicObject>>>,
}

impl WriteCapture {
    fn record(&self, obj: &DynamicObject) {
        self.objects
            .lock()
            .expect("mutex should not be poisoned")
            .push(obj.clone());
    }

    fn last(&self) -> DynamicObject {
        self.objects
            .lock()
            .expect("mutex should not be poisoned")
            .last()
            .cloned()
            .expect("an object should have been written")
    }
}

// ========================================================================
// Namespace handling
// ========================================================================

#[tokio::test]
async fn every_operation_requires_a_namespace() {
    let store = store(MockReleaseClient::new());
    let ctx = RequestContext::default();
    let opts = ListOptions::default();

    let errors = vec![
        store.create(&ctx, application("demo")).await.unwrap_err(),
        store.get(&ctx, "demo").await.unwrap_err(),
        store.list(&ctx, &opts).await.unwrap_err(),
        store
            .update(&ctx, "demo", |_| Ok(application("demo")), true)
            .await
            .unwrap_err(),
        store
            .patch(&ctx, "demo", &Patch::Merge(json!({})))
            .await
            .unwrap_err(),
        store.delete(&ctx, "demo").await.unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, Error::NamespaceRequired { .. }), "{:?}", err);
    }

    match store.watch(&ctx, &opts).await {
        Err(Error::NamespaceRequired { operation }) => assert_eq!(operation, Operation::Watch),
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("watch without namespace should fail"),
    }
}

// ========================================================================
// Get
// ========================================================================

#[tokio::test]
async fn get_projects_backing_release() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|ns, name| {
        assert_eq!(ns, "tenant-a");
        assert_eq!(name, "myapp-demo");
        Ok(release("myapp-demo", "myapp", "3"))
    });

    let app = store(mock).get(&ctx(), "demo").await.unwrap();
    assert_eq!(app.name(), "demo");
    assert_eq!(app.kind, "MyApp");
    assert_eq!(app.status.version, "3");
    assert_eq!(app.app_version, "1.0.0");
    assert_eq!(app.metadata.resource_version.as_deref(), Some("10"));
}

#[tokio::test]
async fn get_missing_release_is_backing_not_found() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Err(not_found(name)));

    let err = store(mock).get(&ctx(), "demo").await.unwrap_err();
    match &err {
        Error::BackingNotFound { name, status } => {
            assert_eq!(name, "demo");
            assert!(status.message.contains("myapp-demo"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.status_code().as_u16(), 404);
}

#[tokio::test]
async fn get_out_of_scope_release_is_not_found() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "other", "1")));

    let err = store(mock).get(&ctx(), "demo").await.unwrap_err();
    assert!(matches!(err, Error::BackingNotFound { .. }));
    assert!(err.to_string().contains("myapps.apps.cozystack.io"));
}

#[tokio::test]
async fn get_backing_failure_keeps_backing_code() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, _| {
        Err(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }))
    });

    let err = store(mock).get(&ctx(), "demo").await.unwrap_err();
    assert!(matches!(err, Error::BackingOperationFailed { operation: Operation::Get, .. }));
    assert_eq!(err.status_code().as_u16(), 403);
}

// ========================================================================
// List
// ========================================================================

#[tokio::test]
async fn list_keeps_in_scope_releases_in_order() {
    let mut mock = MockReleaseClient::new();
    mock.expect_list().returning(|ns, params| {
        assert_eq!(ns, "tenant-a");
        assert_eq!(params.label_selector.as_deref(), Some("team=db"));
        assert_eq!(params.field_selector.as_deref(), Some("metadata.name=myapp-b"));

        let mut malformed = release("myapp-bad", "myapp", "1");
        malformed.data["status"]["conditions"] = json!("not-a-list");

        Ok(ReleaseList {
            resource_version: Some("123".to_string()),
            items: vec![
                release("myapp-b", "myapp", "3"),
                release("other-x", "other", "1"),
                malformed,
                release("myapp-a", "myapp", "2"),
            ],
        })
    });

    let opts = ListOptions {
        label_selector: Some("team=db".to_string()),
        field_selector: Some("metadata.name=myapp-b".to_string()),
        ..Default::default()
    };
    let list = store(mock).list(&ctx(), &opts).await.unwrap();

    assert_eq!(list.kind, "MyAppList");
    assert_eq!(list.metadata.resource_version.as_deref(), Some("123"));
    let names: Vec<_> = list.items.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(list.items[0].status.version, "3");
}

#[tokio::test]
async fn list_tolerates_sloppy_foreign_conditions() {
    let mut mock = MockReleaseClient::new();
    mock.expect_list().returning(|_, _| {
        let mut demo = release("myapp-demo", "myapp", "3");
        demo.data["status"]["conditions"] = json!([
            {
                "type": "Ready",
                "status": "True",
                "reason": "Succeeded",
                "lastTransitionTime": "2026-01-01T00:00:00Z"
            },
            {"type": "Stalled", "status": "False", "reason": "x"},
            {"type": "Reconciling", "status": "Perhaps"},
            42
        ]);
        Ok(ReleaseList {
            resource_version: None,
            items: vec![demo],
        })
    });

    let list = store(mock)
        .list(&ctx(), &ListOptions::default())
        .await
        .unwrap();

    assert_eq!(list.items.len(), 1);
    let types: Vec<_> = list.items[0]
        .status
        .conditions
        .iter()
        .map(|c| c.type_.as_str())
        .collect();
    assert_eq!(types, vec!["Ready"]);
}

#[tokio::test]
async fn get_projects_ready_condition_without_transition_time() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| {
        let mut obj = release(name, "myapp", "3");
        obj.data["status"]["conditions"] = json!([{"type": "Ready", "status": "False"}]);
        Ok(obj)
    });

    let app = store(mock).get(&ctx(), "demo").await.unwrap();
    assert_eq!(app.status.conditions.len(), 1);
    assert!(app.status.conditions[0].last_transition_time.is_none());
}

#[tokio::test]
async fn list_without_selectors_passes_none() {
    let mut mock = MockReleaseClient::new();
    mock.expect_list().returning(|_, params| {
        assert!(params.label_selector.is_none());
        assert!(params.field_selector.is_none());
        Ok(ReleaseList::default())
    });

    let list = store(mock)
        .list(&ctx(), &ListOptions::default())
        .await
        .unwrap();
    assert!(list.items.is_empty());
}

// ========================================================================
// Create
// ========================================================================

#[tokio::test]
async fn create_writes_configured_release() {
    let capture = WriteCapture::default();
    let recorder = capture.clone();

    let mut mock = MockReleaseClient::new();
    mock.expect_create().returning(move |ns, obj| {
        assert_eq!(ns, "tenant-a");
        recorder.record(obj);
        Ok(obj.clone())
    });

    let app = store(mock).create(&ctx(), application("demo")).await.unwrap();
    assert_eq!(app.name(), "demo");
    assert_eq!(app.app_version, "1.2.0");
    assert_eq!(app.spec, Some(json!({"replicas": 2})));

    let written = capture.last();
    assert_eq!(written.metadata.name.as_deref(), Some("myapp-demo"));
    assert_eq!(written.metadata.namespace.as_deref(), Some("tenant-a"));
    assert_eq!(
        written.metadata.labels.as_ref().unwrap()["apps.cozystack.io/application.kind"],
        "MyApp"
    );
    assert_eq!(written.data["spec"]["chart"]["spec"]["chart"], "myapp");
    assert_eq!(written.data["spec"]["chart"]["spec"]["reconcileStrategy"], "Revision");
    assert_eq!(written.data["spec"]["chart"]["spec"]["sourceRef"]["kind"], "Repo");
    assert_eq!(written.data["spec"]["values"]["replicas"], 2);
}

#[tokio::test]
async fn create_rejects_mismatched_namespace() {
    let mut app = application("demo");
    app.metadata.namespace = Some("tenant-b".to_string());

    let err = store(MockReleaseClient::new())
        .create(&ctx(), app)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn create_requires_a_name() {
    let err = store(MockReleaseClient::new())
        .create(&ctx(), application(""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn create_conflict_is_backing_operation_failed() {
    let mut mock = MockReleaseClient::new();
    mock.expect_create().returning(|_, _| {
        Err(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "already exists".to_string(),
            reason: "AlreadyExists".to_string(),
            code: 409,
        }))
    });

    let err = store(mock)
        .create(&ctx(), application("demo"))
        .await
        .unwrap_err();
    match &err {
        Error::BackingOperationFailed {
            operation, name, ..
        } => {
            assert_eq!(*operation, Operation::Create);
            assert_eq!(name, "demo");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.status_code().as_u16(), 409);
    assert_eq!(err.reason(), "AlreadyExists");
}

// ========================================================================
// Update
// ========================================================================

#[tokio::test]
async fn update_replaces_existing_release() {
    let capture = WriteCapture::default();
    let recorder = capture.clone();

    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "myapp", "3")));
    mock.expect_replace().returning(move |_, name, obj| {
        assert_eq!(name, "myapp-demo");
        recorder.record(obj);
        Ok(obj.clone())
    });
    mock.expect_create().never();

    let (app, created) = store(mock)
        .update(
            &ctx(),
            "demo",
            |current| {
                let mut app = current.expect("current application should be passed");
                assert_eq!(app.status.version, "3");
                app.app_version = "2.0.0".to_string();
                Ok(app)
            },
            false,
        )
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(app.app_version, "2.0.0");

    let written = capture.last();
    assert_eq!(written.metadata.resource_version.as_deref(), Some("10"));
    assert_eq!(written.metadata.labels.as_ref().unwrap()["team"], "db");
    assert_eq!(written.data["spec"]["interval"], "5m");
    assert_eq!(written.data["spec"]["chart"]["spec"]["version"], "2.0.0");
}

#[tokio::test]
async fn update_keeps_backing_metadata_it_does_not_model() {
    let capture = WriteCapture::default();
    let recorder = capture.clone();

    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| {
        let mut obj = release(name, "myapp", "3");
        obj.metadata.finalizers = Some(vec!["finalizers.fluxcd.io".to_string()]);
        obj.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "v1".to_string(),
            kind: "Namespace".to_string(),
            name: "tenant-a".to_string(),
            uid: "abcd".to_string(),
            ..Default::default()
        }]);
        obj.data["spec"]["chart"]["metadata"] = json!({"annotations": {"a": "b"}});
        Ok(obj)
    });
    mock.expect_replace().returning(move |_, _, obj| {
        recorder.record(obj);
        Ok(obj.clone())
    });

    store(mock)
        .update(
            &ctx(),
            "demo",
            |current| current.ok_or_else(|| Error::BadRequest("missing".to_string())),
            false,
        )
        .await
        .unwrap();

    let written = capture.last();
    assert_eq!(
        written.metadata.finalizers,
        Some(vec!["finalizers.fluxcd.io".to_string()])
    );
    let owners = written
        .metadata
        .owner_references
        .expect("owner references should be kept");
    assert_eq!(owners[0].uid, "abcd");
    assert_eq!(
        written.data["spec"]["chart"]["metadata"],
        json!({"annotations": {"a": "b"}})
    );
}

#[tokio::test]
async fn update_missing_without_force_is_not_found() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Err(not_found(name)));
    mock.expect_create().never();

    let err = store(mock)
        .update(&ctx(), "demo", |_| Ok(application("demo")), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackingNotFound { .. }));
}

#[tokio::test]
async fn update_missing_with_force_creates() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Err(not_found(name)));
    mock.expect_create().returning(|_, obj| Ok(obj.clone()));
    mock.expect_replace().never();

    let (app, created) = store(mock)
        .update(
            &ctx(),
            "demo",
            |current| {
                assert!(current.is_none());
                Ok(application("demo"))
            },
            true,
        )
        .await
        .unwrap();

    assert!(created);
    assert_eq!(app.name(), "demo");
}

#[tokio::test]
async fn update_propagates_updater_error() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "myapp", "3")));
    mock.expect_replace().never();

    let err = store(mock)
        .update(
            &ctx(),
            "demo",
            |_| Err(Error::BadRequest("invalid values".to_string())),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn update_rejects_renamed_object() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "myapp", "3")));
    mock.expect_replace().never();

    let err = store(mock)
        .update(&ctx(), "demo", |_| Ok(application("other")), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

// ========================================================================
// Patch / Delete
// ========================================================================

#[tokio::test]
async fn patch_is_forwarded_verbatim() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "myapp", "3")));
    mock.expect_patch().returning(|_, name, patch| {
        assert_eq!(name, "myapp-demo");
        match patch {
            Patch::Merge(value) => assert_eq!(value["spec"]["values"]["replicas"], 5),
            other => panic!("unexpected patch: {:?}", other),
        }
        let mut patched = release(name, "myapp", "4");
        patched.data["spec"]["values"] = json!({"replicas": 5});
        Ok(patched)
    });

    let app = store(mock)
        .patch(
            &ctx(),
            "demo",
            &Patch::Merge(json!({"spec": {"values": {"replicas": 5}}})),
        )
        .await
        .unwrap();
    assert_eq!(app.spec, Some(json!({"replicas": 5})));
    assert_eq!(app.status.version, "4");
}

#[tokio::test]
async fn patch_out_of_scope_is_not_found() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "other", "1")));
    mock.expect_patch().never();

    let err = store(mock)
        .patch(&ctx(), "demo", &Patch::Merge(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackingNotFound { .. }));
}

#[tokio::test]
async fn delete_removes_backing_release() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Ok(release(name, "myapp", "3")));
    mock.expect_delete().times(1).returning(|ns, name| {
        assert_eq!(ns, "tenant-a");
        assert_eq!(name, "myapp-demo");
        Ok(())
    });

    store(mock).delete(&ctx(), "demo").await.unwrap();
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let mut mock = MockReleaseClient::new();
    mock.expect_get().returning(|_, name| Err(not_found(name)));
    mock.expect_delete().never();

    let err = store(mock).delete(&ctx(), "demo").await.unwrap_err();
    assert!(matches!(err, Error::BackingNotFound { .. }));
}

// ========================================================================
// Watch
// ========================================================================

#[tokio::test]
async fn watch_adds_configured_labels_and_filters_scope() {
    let (up_tx, up_rx) = mpsc::channel(8);
    let upstream = Mutex::new(Some(ReceiverStream::new(up_rx).boxed()));

    let mut mock = MockReleaseClient::new();
    mock.expect_watch().times(1).returning(move |ns, params, version| {
        assert_eq!(ns, "tenant-a");
        assert_eq!(version, "55");
        assert_eq!(
            params.label_selector.as_deref(),
            Some("apps.cozystack.io/application.kind=MyApp,team=db")
        );
        assert_eq!(params.field_selector.as_deref(), Some("metadata.name=myapp-demo"));
        Ok(upstream
            .lock()
            .expect("mutex should not be poisoned")
            .take()
            .expect("watch should be opened once"))
    });

    let opts = ListOptions {
        label_selector: Some("team=db".to_string()),
        field_selector: Some("metadata.name=myapp-demo".to_string()),
        resource_version: Some("55".to_string()),
    };
    let mut watch = store(mock).watch(&ctx(), &opts).await.unwrap();

    up_tx
        .send(Ok(WatchEvent::Added(release("other-x", "other", "1"))))
        .await
        .unwrap();
    up_tx
        .send(Ok(WatchEvent::Added(release("myapp-demo", "myapp", "3"))))
        .await
        .unwrap();
    drop(up_tx);

    match watch.recv().await {
        Some(ApplicationEvent::Added(app)) => {
            assert_eq!(app.name(), "demo");
            assert_eq!(app.status.version, "3");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(watch.recv().await.is_none());
}

#[tokio::test]
async fn watch_open_failure_is_reported() {
    let mut mock = MockReleaseClient::new();
    mock.expect_watch().returning(|_, _, version| {
        assert_eq!(version, "0");
        Err(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }))
    });

    match store(mock).watch(&ctx(), &ListOptions::default()).await {
        Err(err) => assert_eq!(err.status_code().as_u16(), 403),
        Ok(_) => panic!("watch should fail"),
    }
}

// ========================================================================
// Scenario: prefix myapp-, chart myapp, sourceRef Repo/r/ns
// ========================================================================

#[tokio::test]
async fn scenario_backing_release_lists_as_application() {
    let mut mock = MockReleaseClient::new();
    mock.expect_list().returning(|_, _| {
        Ok(ReleaseList {
            resource_version: None,
            items: vec![release("myapp-demo", "myapp", "3")],
        })
    });

    let list = store(mock)
        .list(&ctx(), &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].name(), "demo");
    assert_eq!(list.items[0].status.version, "3");
}

#[test]
fn convert_to_table_names_resource_on_rejection() {
    let store = store(MockReleaseClient::new());
    let err = store
        .convert_to_table(TableSource::Untyped(&json!(42)), TableOptions::default())
        .unwrap_err();
    match err {
        Error::NotAcceptable { resource, .. } => assert_eq!(resource, "myapps.apps.cozystack.io"),
        other => panic!("unexpected error: {:?}", other),
    }
}
