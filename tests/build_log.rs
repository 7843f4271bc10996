//! End-to-end tests over the public API: write a log, read it back,
//! inspect the reconstructed tree.

use std::sync::Arc;

use girder::{
    read_build, read_build_from, write_build, write_build_compressed, BuildEvent, Correlation,
    DependencyProvider, Diagnostic, Error, MessageImportance, NodeKind, ReaderOptions,
    TargetDefinition, Timestamp, NO_ID,
};

fn ts(micros: i64) -> Timestamp {
    Timestamp::from_micros(micros)
}

fn correlation(context: i32, target: i32, task: i32) -> Correlation {
    Correlation {
        project_context_id: context,
        target_id: target,
        task_id: task,
        ..Correlation::none()
    }
}

fn sample_build() -> Vec<BuildEvent> {
    vec![
        BuildEvent::BuildStarted { timestamp: ts(1) },
        BuildEvent::ProjectStarted {
            correlation: correlation(1, NO_ID, NO_ID),
            parent_project_context_id: NO_ID,
            timestamp: ts(2),
            project_file: "/src/app.csproj".to_string(),
            target_names: Some("Build".to_string()),
            global_properties: vec![("Configuration".to_string(), "Release".to_string())],
            properties: Vec::new(),
        },
        BuildEvent::TargetStarted {
            correlation: correlation(1, 5, NO_ID),
            timestamp: ts(3),
            target_name: "Build".to_string(),
            parent_target: Some("Root".to_string()),
            source_file: None,
        },
        BuildEvent::TaskStarted {
            correlation: correlation(1, 5, 9),
            timestamp: ts(4),
            task_name: "Csc".to_string(),
            source_file: Some("Microsoft.CSharp.targets".to_string()),
            line: 77,
        },
        BuildEvent::Message {
            correlation: correlation(1, 5, 9),
            timestamp: ts(5),
            importance: MessageImportance::Normal,
            text: "compiling 12 files".to_string(),
        },
        BuildEvent::Warning(Diagnostic {
            correlation: correlation(1, 5, 9),
            timestamp: ts(6),
            code: Some("CS0168".to_string()),
            file: Some("Program.cs".to_string()),
            line: 12,
            column: 9,
            text: "unused variable".to_string(),
        }),
        BuildEvent::TaskFinished {
            correlation: correlation(1, 5, 9),
            timestamp: ts(7),
            task_name: "Csc".to_string(),
            succeeded: true,
        },
        BuildEvent::TargetFinished {
            correlation: correlation(1, 5, NO_ID),
            timestamp: ts(8),
            target_name: "Build".to_string(),
            succeeded: true,
            outputs: Vec::new(),
        },
        BuildEvent::ProjectFinished {
            project_context_id: 1,
            timestamp: ts(9),
            succeeded: true,
        },
        BuildEvent::BuildFinished {
            timestamp: ts(10),
            succeeded: true,
        },
    ]
}

#[test]
fn test_file_roundtrip_reconstructs_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build.log.bin");

    let file = std::fs::File::create(&path).unwrap();
    write_build(file, &sample_build()).unwrap();

    let result = read_build(&path, ReaderOptions::default(), None).unwrap();
    assert!(result.errors.is_empty());

    let tree = &result.tree;
    assert_eq!(tree.node(tree.root()).succeeded, Some(true));
    let project = tree
        .find_child(tree.root(), |n| n.text == "/src/app.csproj")
        .unwrap();
    let target = tree.find_descendant(project, |n| n.text == "Build").unwrap();
    let task = tree.find_child(target, |n| n.text == "Csc").unwrap();
    assert!(tree
        .find_child(task, |n| n.text == "compiling 12 files")
        .is_some());
    // The warning shows up both at its origin and in the collected folder.
    assert!(tree
        .find_child(task, |n| n.text == "unused variable")
        .is_some());
    let warnings = tree
        .find_child(tree.root(), |n| n.text == "Warnings")
        .unwrap();
    assert_eq!(tree.children(warnings).len(), 1);
}

#[test]
fn test_compressed_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build.log.bin.gz");

    girder::write_build_file(&path, &sample_build(), true).unwrap();

    let result = read_build(&path, ReaderOptions::default(), None).unwrap();
    assert!(result.errors.is_empty());
    assert!(result
        .tree
        .find_descendant(result.tree.root(), |n| n.text == "Csc")
        .is_some());
}

#[test]
fn test_compressed_roundtrip_is_transparent() {
    let bytes = write_build_compressed(Vec::new(), &sample_build()).unwrap();
    // Gzip magic present, auto-detected on read.
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let result =
        read_build_from(std::io::Cursor::new(bytes), ReaderOptions::default(), None).unwrap();
    assert!(result.errors.is_empty());
    assert!(result
        .tree
        .find_descendant(result.tree.root(), |n| n.text == "Csc")
        .is_some());
}

#[test]
fn test_end_of_file_only_stream_yields_empty_tree() {
    let bytes = write_build(Vec::new(), &[]).unwrap();
    let result =
        read_build_from(std::io::Cursor::new(bytes), ReaderOptions::default(), None).unwrap();
    assert!(result.errors.is_empty());
    assert!(result.tree.is_empty());
}

#[test]
fn test_future_version_rejected_at_open() {
    // Header claiming format 99 with minimum reader 99.
    let bytes = vec![99u8, 99u8];
    let err = read_build_from(std::io::Cursor::new(bytes), ReaderOptions::default(), None)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion { .. }));
}

#[test]
fn test_bad_event_collected_without_losing_tree() {
    let mut events = sample_build();
    // A message naming a task that never started; construction records one
    // error and keeps going.
    events.insert(
        2,
        BuildEvent::Message {
            correlation: correlation(1, 5, 42),
            timestamp: ts(2),
            importance: MessageImportance::Low,
            text: "orphan message".to_string(),
        },
    );

    let bytes = write_build(Vec::new(), &events).unwrap();
    let result =
        read_build_from(std::io::Cursor::new(bytes), ReaderOptions::default(), None).unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0], Error::Construction(_)));
    assert!(result
        .tree
        .find_descendant(result.tree.root(), |n| n.text == "Csc")
        .is_some());
}

#[test]
fn test_truncated_file_reports_corruption_but_keeps_partial_tree() {
    let bytes = write_build(Vec::new(), &sample_build()).unwrap();
    // Drop the end-of-file marker and part of the last record.
    let truncated = &bytes[..bytes.len() - 6];

    let result = read_build_from(
        std::io::Cursor::new(truncated.to_vec()),
        ReaderOptions::default(),
        None,
    )
    .unwrap();
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0], Error::Corruption(_)));
    // Everything before the corruption point still materialized.
    assert!(result
        .tree
        .find_descendant(result.tree.root(), |n| n.text == "Csc")
        .is_some());
}

struct DeclaredDeps;

impl DependencyProvider for DeclaredDeps {
    fn target_definitions(&self, _project_file: &str) -> Vec<TargetDefinition> {
        vec![TargetDefinition::new("B", "A")]
    }
}

#[test]
fn test_unparented_target_nests_under_declared_dependent() {
    let events = vec![
        BuildEvent::ProjectStarted {
            correlation: correlation(1, NO_ID, NO_ID),
            parent_project_context_id: NO_ID,
            timestamp: ts(1),
            project_file: "/src/app.csproj".to_string(),
            target_names: None,
            global_properties: Vec::new(),
            properties: Vec::new(),
        },
        BuildEvent::TargetStarted {
            correlation: correlation(1, 5, NO_ID),
            timestamp: ts(2),
            target_name: "B".to_string(),
            parent_target: Some("Top".to_string()),
            source_file: None,
        },
        BuildEvent::TargetStarted {
            correlation: correlation(1, 6, NO_ID),
            timestamp: ts(3),
            target_name: "A".to_string(),
            parent_target: None,
            source_file: None,
        },
    ];

    let bytes = write_build(Vec::new(), &events).unwrap();
    let result = read_build_from(
        std::io::Cursor::new(bytes),
        ReaderOptions::default(),
        Some(Arc::new(DeclaredDeps) as Arc<dyn DependencyProvider>),
    )
    .unwrap();

    let tree = &result.tree;
    let project = tree
        .find_child(tree.root(), |n| n.text == "/src/app.csproj")
        .unwrap();
    let b = tree.find_child(project, |n| n.text == "B").unwrap();
    assert!(tree.find_child(b, |n| n.text == "A").is_some());
}

#[test]
fn test_targets_stay_reachable_when_dependent_nests_beneath() {
    // A starts unparented, then B starts naming A as its explicit parent
    // while also declaring DependsOnTargets="A". Finalization must not
    // nest A under B, which would orphan both from the root.
    let events = vec![
        BuildEvent::ProjectStarted {
            correlation: correlation(1, NO_ID, NO_ID),
            parent_project_context_id: NO_ID,
            timestamp: ts(1),
            project_file: "/src/app.csproj".to_string(),
            target_names: None,
            global_properties: Vec::new(),
            properties: Vec::new(),
        },
        BuildEvent::TargetStarted {
            correlation: correlation(1, 6, NO_ID),
            timestamp: ts(2),
            target_name: "A".to_string(),
            parent_target: None,
            source_file: None,
        },
        BuildEvent::TargetStarted {
            correlation: correlation(1, 5, NO_ID),
            timestamp: ts(3),
            target_name: "B".to_string(),
            parent_target: Some("A".to_string()),
            source_file: None,
        },
    ];

    let bytes = write_build(Vec::new(), &events).unwrap();
    let result = read_build_from(
        std::io::Cursor::new(bytes),
        ReaderOptions::default(),
        Some(Arc::new(DeclaredDeps) as Arc<dyn DependencyProvider>),
    )
    .unwrap();

    let tree = &result.tree;
    let a = tree.find_descendant(tree.root(), |n| n.text == "A").unwrap();
    let b = tree.find_descendant(tree.root(), |n| n.text == "B").unwrap();
    assert_eq!(tree.parent(b), Some(a));
    let project = tree
        .find_child(tree.root(), |n| n.text == "/src/app.csproj")
        .unwrap();
    assert_eq!(tree.parent(a), Some(project));
}

#[test]
fn test_indented_item_block_materializes_structure() {
    let text = concat!(
        "Output Item(s):\n",
        "    BuiltAssemblies\n",
        "        bin/app.dll\n",
        "                TargetPath=app.dll",
    );
    let events = vec![
        BuildEvent::ProjectStarted {
            correlation: correlation(1, NO_ID, NO_ID),
            parent_project_context_id: NO_ID,
            timestamp: ts(1),
            project_file: "/src/app.csproj".to_string(),
            target_names: None,
            global_properties: Vec::new(),
            properties: Vec::new(),
        },
        BuildEvent::Message {
            correlation: correlation(1, NO_ID, NO_ID),
            timestamp: ts(2),
            importance: MessageImportance::Low,
            text: text.to_string(),
        },
    ];

    let bytes = write_build(Vec::new(), &events).unwrap();
    let result =
        read_build_from(std::io::Cursor::new(bytes), ReaderOptions::default(), None).unwrap();

    let tree = &result.tree;
    let group = tree
        .find_descendant(tree.root(), |n| n.text == "BuiltAssemblies")
        .unwrap();
    assert!(matches!(tree.node(group).kind, NodeKind::Parameter));
    let item = tree.find_child(group, |n| n.text == "bin/app.dll").unwrap();
    let metadata = tree.find_child(item, |n| n.text == "TargetPath").unwrap();
    match &tree.node(metadata).kind {
        NodeKind::Metadata { value } => assert_eq!(value, "app.dll"),
        other => panic!("expected metadata node, got {other:?}"),
    }
}

#[test]
fn test_none_and_empty_strings_survive_roundtrip() {
    let events = vec![BuildEvent::TargetStarted {
        correlation: correlation(1, 5, NO_ID),
        timestamp: ts(1),
        target_name: "Build".to_string(),
        parent_target: None,
        source_file: Some(String::new()),
    }];

    let bytes = write_build(Vec::new(), &events).unwrap();

    let reader = girder::open_stream(std::io::Cursor::new(bytes), ReaderOptions::default()).unwrap();
    let records: Vec<_> = reader.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(records.len(), 1);
    match &records[0].event {
        BuildEvent::TargetStarted {
            parent_target,
            source_file,
            ..
        } => {
            assert_eq!(parent_target.as_deref(), None);
            assert_eq!(source_file.as_deref(), Some(""));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
