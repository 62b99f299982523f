use relink_core::config::RelinkConfig;
use relink_core::ingest::Ingestor;
use relink_core::pending::PendingCallStore;
use relink_core::store::{GraphBackend, MemoryBackend};
use relink_core::types::{LookupQuery, NodeLabel, PendingCall, RelType};
use relink_test::{
    BATCH_APP, CONSUMER_APP, FJORD_APP, FQ_APP, TELEMETRY_APP, Workspace, backends, call_edges,
    calls_from, java_member, module_qn,
};

fn ingestor() -> Ingestor {
    Ingestor::new(RelinkConfig::default())
}

fn app_run(project: &str) -> String {
    java_member(project, "com.example.app", "App", "run")
}

fn greet(project: &str) -> String {
    java_member(project, "com.example.lib", "LibraryClass", "greet")
}

#[tokio::test]
async fn library_then_consumer_links_in_the_consumer_pass() {
    let ws = Workspace::new();
    let library = ws.library("library");
    let consumer = ws.java_app("consumer", CONSUMER_APP);

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        let mut ingestor = ingestor();
        ingestor.ingest(backend, &library).await.unwrap();
        let stats = ingestor.ingest(backend, &consumer).await.unwrap();

        assert_eq!(stats.cross_project_edges, 1, "{name}");
        assert_eq!(stats.pending_recorded, 0, "{name}");

        let edges = calls_from(backend, &app_run("consumer")).await.unwrap();
        assert_eq!(edges.len(), 1, "{name}");
        assert_eq!(edges[0].to, greet("library"), "{name}");
        assert_eq!(edges[0].resolution, "cross_project", "{name}");
        assert!(backend.get_pending().await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn declared_package_names_the_caller_when_directories_disagree() {
    let ws = Workspace::new();
    let library = ws.library("library");
    // `package com.example.app;` filed under `com/microsoft/app/`.
    let consumer = ws.microsoft_app("consumer", CONSUMER_APP);

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        let mut ingestor = ingestor();
        ingestor.ingest(backend, &library).await.unwrap();
        let stats = ingestor.ingest(backend, &consumer).await.unwrap();
        assert_eq!(stats.cross_project_edges, 1, "{name}");

        let edges = call_edges(backend).await.unwrap();
        assert_eq!(edges.len(), 1, "{name}");
        assert_eq!(
            edges[0].from,
            "consumer.src.main.java.com.example.app.App.App.run",
            "{name}"
        );
        assert_eq!(edges[0].to, greet("library"), "{name}");
        assert!(
            backend
                .nodes(NodeLabel::Module)
                .await
                .unwrap()
                .iter()
                .all(|n| !n.qualified_name.contains("microsoft")),
            "{name}"
        );
    }
}

#[tokio::test]
async fn consumer_then_library_reconciles_the_same_edge() {
    let ws = Workspace::new();
    let library = ws.library("library");
    let consumer = ws.java_app("consumer", CONSUMER_APP);

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        let mut ingestor = ingestor();

        let first = ingestor.ingest(backend, &consumer).await.unwrap();
        assert_eq!(first.pending_recorded, 1, "{name}");
        assert!(call_edges(backend).await.unwrap().is_empty(), "{name}");

        let pending = backend.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1, "{name}");
        assert_eq!(pending[0].caller_qn, app_run("consumer"), "{name}");
        assert_eq!(pending[0].caller_type, NodeLabel::Method, "{name}");
        assert_eq!(
            pending[0].candidates,
            vec!["com.example.lib.LibraryClass.LibraryClass.greet"],
            "{name}"
        );
        assert!(pending[0].caller_was_parsed, "{name}");

        let second = ingestor.ingest(backend, &library).await.unwrap();
        assert_eq!(second.reconciled_edges, 1, "{name}");

        let edges = call_edges(backend).await.unwrap();
        assert_eq!(edges.len(), 1, "{name}");
        assert_eq!(edges[0].from, app_run("consumer"), "{name}");
        assert_eq!(edges[0].to, greet("library"), "{name}");
        assert_eq!(edges[0].resolution, "reconciled", "{name}");
        assert!(backend.get_pending().await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn ingestion_order_does_not_change_the_linked_pairs() {
    let ws = Workspace::new();
    let library = ws.library("library");
    let consumer = ws.java_app("consumer", BATCH_APP);

    let pairs = |edges: Vec<relink_test::CallEdge>| {
        edges
            .into_iter()
            .map(|e| (e.from, e.to))
            .collect::<Vec<_>>()
    };

    let forward = MemoryBackend::new();
    let mut first = ingestor();
    first.ingest(&forward, &library).await.unwrap();
    first.ingest(&forward, &consumer).await.unwrap();

    let reverse = MemoryBackend::new();
    let mut second = ingestor();
    second.ingest(&reverse, &consumer).await.unwrap();
    second.ingest(&reverse, &library).await.unwrap();

    let forward = pairs(call_edges(&forward).await.unwrap());
    assert_eq!(forward.len(), 4);
    assert_eq!(forward, pairs(call_edges(&reverse).await.unwrap()));
}

#[tokio::test]
async fn telemetry_consumer_first_links_through_field_type() {
    let ws = Workspace::new();
    let consumer = ws.microsoft_app("consumer", TELEMETRY_APP);
    let telemetry = ws.telemetry_library("microsoft-telemetry");

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        let mut ingestor = ingestor();

        let first = ingestor.ingest(backend, &consumer).await.unwrap();
        assert_eq!(first.pending_recorded, 1, "{name}");

        let second = ingestor.ingest(backend, &telemetry).await.unwrap();
        assert_eq!(second.reconciled_edges, 1, "{name}");

        let run = java_member("consumer", "com.microsoft.app", "App", "run");
        let edges = calls_from(backend, &run).await.unwrap();
        assert_eq!(edges.len(), 1, "{name}");
        assert_eq!(
            edges[0].to,
            java_member(
                "microsoft-telemetry",
                "com.microsoft.telemetry",
                "TelemetryProvider",
                "resolveCoordinate"
            ),
            "{name}"
        );
        assert!(backend.get_pending().await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn third_party_calls_are_neither_fetched_nor_recorded() {
    let ws = Workspace::new();
    let consumer = ws.microsoft_app("consumer", FJORD_APP);
    let adapter = ws.fjord_library("fjord-telemetry-adapter");

    let backend = MemoryBackend::new();
    let mut ingestor = ingestor();

    let stats = ingestor.ingest(&backend, &consumer).await.unwrap();
    assert_eq!(stats.pending_recorded, 0);
    assert_eq!(stats.candidates_dropped, 1);
    assert!(backend.fetch_log().is_empty());

    ingestor.ingest(&backend, &adapter).await.unwrap();
    assert!(backend.fetch_log().is_empty());
    assert!(call_edges(&backend).await.unwrap().is_empty());
    assert!(backend.get_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn fully_qualified_receiver_links_without_an_import() {
    let ws = Workspace::new();
    let library = ws.library("fq-library");
    let consumer = ws.java_app("fq-consumer", FQ_APP);

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        let mut ingestor = ingestor();
        ingestor.ingest(backend, &library).await.unwrap();
        let stats = ingestor.ingest(backend, &consumer).await.unwrap();
        assert_eq!(stats.cross_project_edges, 1, "{name}");

        let edges = calls_from(backend, &app_run("fq-consumer")).await.unwrap();
        assert_eq!(edges.len(), 1, "{name}");
        assert_eq!(edges[0].to, greet("fq-library"), "{name}");
    }
}

#[tokio::test]
async fn one_pass_issues_exactly_two_fetches() {
    let ws = Workspace::new();
    let library = ws.library("library");
    let consumer = ws.java_app("consumer", BATCH_APP);

    let backend = MemoryBackend::new();
    let mut ingestor = ingestor();
    ingestor.ingest(&backend, &library).await.unwrap();
    backend.clear_fetch_log();

    let stats = ingestor.ingest(&backend, &consumer).await.unwrap();
    assert_eq!(stats.local_edges, 1);
    assert_eq!(stats.cross_project_edges, 3);

    let expected = vec![
        "com.example.lib.LibraryClass.LibraryClass.farewell".to_string(),
        "com.example.lib.LibraryClass.LibraryClass.greet".to_string(),
        "com.example.lib.LibraryHelper.LibraryHelper.help".to_string(),
    ];
    let log = backend.fetch_log();
    assert_eq!(log.len(), 2);
    match (&log[0], &log[1]) {
        (
            LookupQuery::Exact {
                qualified_names, ..
            },
            LookupQuery::Suffix { suffixes, .. },
        ) => {
            assert_eq!(qualified_names, &expected);
            let dotted: Vec<String> = expected.iter().map(|c| format!(".{c}")).collect();
            assert_eq!(suffixes, &dotted);
        }
        other => panic!("unexpected fetch order: {other:?}"),
    }
}

#[tokio::test]
async fn unparsed_records_survive_later_passes() {
    let ws = Workspace::new();
    let telemetry = ws.telemetry_library("telemetry-lib");

    let record = PendingCall {
        caller_type: NodeLabel::Method,
        caller_qn: java_member("consumer", "com.microsoft.app", "App", "run"),
        module_qn: module_qn("consumer", "src/main/java/com/microsoft/app/App.java"),
        project_name: "consumer".into(),
        call_name: "telemetryProvider.resolveCoordinate".into(),
        candidates: vec![
            "com.microsoft.telemetry.TelemetryProvider.TelemetryProvider.resolveCoordinate".into(),
        ],
        language: "java".into(),
        caller_was_parsed: false,
    };

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        PendingCallStore::new(backend).record(&record).await.unwrap();

        let mut ingestor = ingestor();
        let stats = ingestor.ingest(backend, &telemetry).await.unwrap();
        assert_eq!(stats.reconciled_edges, 0, "{name}");
        assert!(call_edges(backend).await.unwrap().is_empty(), "{name}");
        assert_eq!(backend.get_pending().await.unwrap(), vec![record.clone()], "{name}");

        let reconcile = ingestor.reconcile(backend).await.unwrap();
        assert_eq!(reconcile.unparsed_retained, 1, "{name}");
        assert_eq!(reconcile.reconciled_edges, 0, "{name}");
        assert_eq!(backend.get_pending().await.unwrap(), vec![record.clone()], "{name}");
    }
}

#[tokio::test]
async fn broken_caller_never_gets_an_edge() {
    let ws = Workspace::new();
    let library = ws.library("library");
    let consumer = ws.java_app(
        "consumer",
        "package com.example.app;\n\nimport com.example.lib.LibraryClass;\n\npublic class App {\n    void run() { int x = ; LibraryClass.greet(); }\n}\n",
    );

    let backend = MemoryBackend::new();
    let mut ingestor = ingestor();
    ingestor.ingest(&backend, &library).await.unwrap();
    ingestor.ingest(&backend, &consumer).await.unwrap();

    let run = app_run("consumer");
    assert!(calls_from(&backend, &run).await.unwrap().is_empty());
    for call in backend.get_pending().await.unwrap() {
        if call.caller_qn == run {
            assert!(!call.caller_was_parsed);
        }
    }

    // Later passes keep the record unchanged.
    let before = backend.get_pending().await.unwrap();
    ingestor.reconcile(&backend).await.unwrap();
    assert_eq!(backend.get_pending().await.unwrap(), before);
}

#[tokio::test]
async fn repeated_passes_are_idempotent() {
    let ws = Workspace::new();
    let library = ws.library("library");
    let consumer = ws.java_app("consumer", BATCH_APP);

    for (name, backend) in backends() {
        let backend = backend.as_ref();
        let mut ingestor = ingestor();
        ingestor.ingest(backend, &consumer).await.unwrap();
        ingestor.ingest(backend, &library).await.unwrap();
        let edges = call_edges(backend).await.unwrap();
        let stats = backend.stats().await.unwrap();

        ingestor.ingest(backend, &consumer).await.unwrap();
        ingestor.ingest(backend, &library).await.unwrap();
        ingestor.reconcile(backend).await.unwrap();

        let pairs = |edges: &[relink_test::CallEdge]| {
            edges
                .iter()
                .map(|e| (e.from.clone(), e.to.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            pairs(&call_edges(backend).await.unwrap()),
            pairs(&edges),
            "{name}"
        );
        let again = backend.stats().await.unwrap();
        assert_eq!(again.nodes_by_label, stats.nodes_by_label, "{name}");
        assert_eq!(
            again.relationships_by_type[RelType::Calls.as_str()],
            4,
            "{name}"
        );
        assert_eq!(again.pending_calls, 0, "{name}");
        assert_eq!(again.projects, 2, "{name}");
    }
}
