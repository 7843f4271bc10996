//! Incremental event-to-tree construction.
//!
//! Events arrive in whatever order the build tool's worker threads deliver
//! them; within one correlation context they are causal (*Started* before
//! *Finished* before nested children). Correlation maps are concurrent;
//! topology mutation is serialized by one coarse lock — event volume, not
//! lock contention, dominates cost here.
//!
//! Construction is best-effort: a handler failure is recorded in the error
//! sink and the next event still populates the tree. Partial trees are a
//! valid, expected outcome for corrupted inputs.

use dashmap::DashMap;
use girder_classify::{classify, Classified, Fragment, FragmentKind, MessageContext};
use girder_codec::{BuildEvent, Diagnostic, ItemPayload};
use girder_core::{Correlation, DependencyProvider, Error, Timestamp};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::graph::TargetGraph;
use crate::node::{BuildTree, NodeId, NodeKind};

/// Completed construction: the tree plus every contained handler error.
#[derive(Debug)]
pub struct BuildResult {
    /// The (possibly partial) build tree
    pub tree: BuildTree,
    /// Errors contained during construction, in arrival order
    pub errors: Vec<Error>,
}

/// State behind the coarse topology lock.
///
/// The single-entry last-resolved-target cache lives here because it is
/// not safe under concurrent mutation outside the same critical section.
struct TreeState {
    tree: BuildTree,
    last_target: Option<((i32, i32), NodeId)>,
    /// (project node, target node) pairs awaiting graph-based reattachment.
    pending_unparented: Vec<(NodeId, NodeId)>,
    finalized: bool,
}

/// Builds the tree incrementally from decoded events.
pub struct TreeBuilder {
    state: Mutex<TreeState>,
    /// Project context id -> project node (stub on first reference).
    projects: DashMap<i32, NodeId>,
    /// (project context id, target id) -> target node.
    targets: DashMap<(i32, i32), NodeId>,
    /// (project context id, lowercased target name) -> target node.
    targets_by_name: DashMap<(i32, String), NodeId>,
    /// (project context id, task id) -> task node.
    tasks: DashMap<(i32, i32), NodeId>,
    /// Task name -> assembly location, fed by `Using task` messages.
    task_assemblies: DashMap<String, String>,
    errors: Mutex<Vec<Error>>,
    provider: Option<Arc<dyn DependencyProvider>>,
}

impl TreeBuilder {
    /// Create a builder; the provider, when given, enables dependency-shaped
    /// reattachment of unparented targets during finalization.
    pub fn new(provider: Option<Arc<dyn DependencyProvider>>) -> Self {
        TreeBuilder {
            state: Mutex::new(TreeState {
                tree: BuildTree::new(),
                last_target: None,
                pending_unparented: Vec::new(),
                finalized: false,
            }),
            projects: DashMap::new(),
            targets: DashMap::new(),
            targets_by_name: DashMap::new(),
            tasks: DashMap::new(),
            task_assemblies: DashMap::new(),
            errors: Mutex::new(Vec::new()),
            provider,
        }
    }

    /// Apply one event. Never fails past its own boundary: a handler error
    /// is recorded and later events still apply.
    pub fn handle(&self, event: &BuildEvent) {
        let result = match event {
            BuildEvent::BuildStarted { timestamp } => self.on_build_started(*timestamp),
            BuildEvent::BuildFinished {
                timestamp,
                succeeded,
            } => self.on_build_finished(*timestamp, *succeeded),
            BuildEvent::ProjectStarted {
                correlation,
                parent_project_context_id,
                timestamp,
                project_file,
                target_names,
                global_properties,
                properties,
            } => self.on_project_started(
                correlation,
                *parent_project_context_id,
                *timestamp,
                project_file,
                target_names.as_deref(),
                global_properties,
                properties,
            ),
            BuildEvent::ProjectFinished {
                project_context_id,
                timestamp,
                succeeded,
            } => self.on_project_finished(*project_context_id, *timestamp, *succeeded),
            BuildEvent::TargetStarted {
                correlation,
                timestamp,
                target_name,
                parent_target,
                source_file: _,
            } => self.on_target_started(correlation, *timestamp, target_name, parent_target.as_deref()),
            BuildEvent::TargetFinished {
                correlation,
                timestamp,
                target_name,
                succeeded,
                outputs,
            } => self.on_target_finished(correlation, *timestamp, target_name, *succeeded, outputs),
            BuildEvent::TaskStarted {
                correlation,
                timestamp,
                task_name,
                source_file: _,
                line: _,
            } => self.on_task_started(correlation, *timestamp, task_name),
            BuildEvent::TaskFinished {
                correlation,
                timestamp,
                task_name: _,
                succeeded,
            } => self.on_task_finished(correlation, *timestamp, *succeeded),
            BuildEvent::Message {
                correlation,
                timestamp: _,
                importance: _,
                text,
            } => self.on_message(correlation, text),
            BuildEvent::Warning(diag) => self.on_diagnostic(diag, false),
            BuildEvent::Error(diag) => self.on_diagnostic(diag, true),
            BuildEvent::Extended {
                correlation,
                timestamp: _,
                event_type,
                fields,
                text,
            } => self.on_extended(correlation, event_type, fields, text.as_deref()),
            BuildEvent::Blob { name, bytes } => self.on_blob(name, bytes.len()),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "event handler failed; continuing");
            self.errors.lock().push(e);
        }
    }

    /// Run finalization (idempotent) and return the tree with collected
    /// errors. Also invoked by `BuildFinished`, but calling it here covers
    /// streams that never carried one.
    pub fn finish(self) -> BuildResult {
        {
            let mut state = self.state.lock();
            self.finalize(&mut state);
        }
        let state = self.state.into_inner();
        BuildResult {
            tree: state.tree,
            errors: self.errors.into_inner(),
        }
    }

    /// Assembly location recorded for a task name, if any message named it.
    pub fn task_assembly(&self, task_name: &str) -> Option<String> {
        self.task_assemblies
            .get(task_name)
            .map(|entry| entry.value().clone())
    }

    fn on_build_started(&self, timestamp: Timestamp) -> Result<(), Error> {
        let mut state = self.state.lock();
        let root = state.tree.root();
        state.tree.node_mut(root).start = Some(timestamp);
        Ok(())
    }

    fn on_build_finished(&self, timestamp: Timestamp, succeeded: bool) -> Result<(), Error> {
        let mut state = self.state.lock();
        let root = state.tree.root();
        {
            let node = state.tree.node_mut(root);
            node.end = Some(timestamp);
            node.succeeded = Some(succeeded);
        }
        self.finalize(&mut state);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn on_project_started(
        &self,
        correlation: &Correlation,
        parent_project_context_id: i32,
        timestamp: Timestamp,
        project_file: &str,
        _target_names: Option<&str>,
        global_properties: &[(String, String)],
        properties: &[(String, String)],
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        let id = self.project_node(&mut state, correlation.project_context_id);

        // Fill the (possibly pre-existing) stub in place; child references
        // created before this event stay valid.
        {
            let node = state.tree.node_mut(id);
            node.text = project_file.to_string();
            node.start = Some(timestamp);
            if let NodeKind::Project {
                project_file: file, ..
            } = &mut node.kind
            {
                *file = project_file.to_string();
            }
        }

        if state.tree.parent(id).is_none() {
            let parent = if parent_project_context_id > 0 {
                self.project_node(&mut state, parent_project_context_id)
            } else {
                state.tree.root()
            };
            state.tree.add_child(parent, id);
        }

        if !global_properties.is_empty() {
            let folder = state.tree.ensure_folder(id, "Global Properties");
            Self::add_properties(&mut state.tree, folder, global_properties);
        }
        if !properties.is_empty() {
            let folder = state.tree.ensure_folder(id, "Properties");
            Self::add_properties(&mut state.tree, folder, properties);
        }
        Ok(())
    }

    fn on_project_finished(
        &self,
        project_context_id: i32,
        timestamp: Timestamp,
        succeeded: bool,
    ) -> Result<(), Error> {
        let id = self
            .projects
            .get(&project_context_id)
            .map(|e| *e.value())
            .ok_or_else(|| {
                Error::Construction(format!(
                    "project finished for unknown context {project_context_id}"
                ))
            })?;
        let mut state = self.state.lock();
        let node = state.tree.node_mut(id);
        node.end = Some(timestamp);
        node.succeeded = Some(succeeded);
        Ok(())
    }

    fn on_target_started(
        &self,
        correlation: &Correlation,
        timestamp: Timestamp,
        target_name: &str,
        parent_target: Option<&str>,
    ) -> Result<(), Error> {
        let context = correlation.project_context_id;
        let mut state = self.state.lock();
        // A sentinel context has no owning project; those targets hang off
        // the build root instead of minting a phantom project stub.
        let project = if correlation.has_project_context() {
            self.project_node(&mut state, context)
        } else {
            state.tree.root()
        };

        let id = state.tree.alloc(
            NodeKind::Target {
                target_id: correlation.target_id,
                parented: parent_target.is_some(),
            },
            target_name,
        );
        state.tree.node_mut(id).start = Some(timestamp);

        match parent_target {
            Some(parent_name) => {
                let parent = self
                    .targets_by_name
                    .get(&(context, parent_name.to_lowercase()))
                    .map(|e| *e.value())
                    .unwrap_or(project);
                state.tree.add_child(parent, id);
            }
            None => {
                // Parent unknown from the stream; leave unattached until the
                // finalization pass consults the dependency graph.
                state.pending_unparented.push((project, id));
            }
        }

        self.targets.insert((context, correlation.target_id), id);
        self.targets_by_name
            .insert((context, target_name.to_lowercase()), id);
        state.last_target = Some(((context, correlation.target_id), id));
        Ok(())
    }

    fn on_target_finished(
        &self,
        correlation: &Correlation,
        timestamp: Timestamp,
        target_name: &str,
        succeeded: bool,
        outputs: &[ItemPayload],
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        let id = self
            .resolve_target(&state, correlation)
            .ok_or_else(|| {
                Error::Construction(format!("target '{target_name}' finished without a start"))
            })?;
        {
            let node = state.tree.node_mut(id);
            node.end = Some(timestamp);
            node.succeeded = Some(succeeded);
        }
        if !outputs.is_empty() {
            let folder = state.tree.ensure_folder(id, "TargetOutputs");
            for output in outputs {
                let item = state.tree.alloc(NodeKind::Item, output.spec.clone());
                state.tree.add_child(folder, item);
                for (name, value) in &output.metadata {
                    let metadata = state.tree.alloc(
                        NodeKind::Metadata {
                            value: value.clone(),
                        },
                        name.clone(),
                    );
                    state.tree.add_child(item, metadata);
                }
            }
        }
        Ok(())
    }

    fn on_task_started(
        &self,
        correlation: &Correlation,
        timestamp: Timestamp,
        task_name: &str,
    ) -> Result<(), Error> {
        let context = correlation.project_context_id;
        let mut state = self.state.lock();
        let parent = self
            .resolve_target(&state, correlation)
            .unwrap_or_else(|| self.project_node_existing(&state, context));

        let id = state.tree.alloc(
            NodeKind::Task {
                task_id: correlation.task_id,
            },
            task_name,
        );
        state.tree.node_mut(id).start = Some(timestamp);
        state.tree.add_child(parent, id);
        self.tasks.insert((context, correlation.task_id), id);
        Ok(())
    }

    fn on_task_finished(
        &self,
        correlation: &Correlation,
        timestamp: Timestamp,
        succeeded: bool,
    ) -> Result<(), Error> {
        let id = self
            .tasks
            .get(&(correlation.project_context_id, correlation.task_id))
            .map(|e| *e.value())
            .ok_or_else(|| {
                Error::Construction(format!(
                    "task {} finished without a start",
                    correlation.task_id
                ))
            })?;
        let mut state = self.state.lock();
        let node = state.tree.node_mut(id);
        node.end = Some(timestamp);
        node.succeeded = Some(succeeded);
        Ok(())
    }

    fn on_message(&self, correlation: &Correlation, text: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        let (attach, task_name) = self.resolve_origin(&state, correlation)?;
        let context = MessageContext {
            task_name: task_name.as_deref(),
        };

        match classify(text, &context) {
            Classified::Plain => {
                let node = state.tree.alloc(NodeKind::Message, text);
                state.tree.add_child(attach, node);
            }
            Classified::UsingTask {
                task_name,
                assembly,
            } => {
                self.task_assemblies.insert(task_name, assembly);
                let node = state.tree.alloc(NodeKind::Message, text);
                state.tree.add_child(attach, node);
            }
            Classified::RestorePhase { phase } => {
                let folder = state.tree.ensure_folder(attach, &phase);
                let node = state.tree.alloc(NodeKind::Message, text);
                state.tree.add_child(folder, node);
            }
            Classified::Fragment(fragment) => {
                Self::materialize(&mut state.tree, attach, &fragment);
            }
        }
        Ok(())
    }

    fn on_diagnostic(&self, diag: &Diagnostic, is_error: bool) -> Result<(), Error> {
        let mut state = self.state.lock();
        let (attach, _) = self.resolve_origin(&state, &diag.correlation)?;

        // Dual index: attributed to the originating node and collected in
        // the top-level folder.
        let origin_node = Self::alloc_diagnostic(&mut state.tree, diag, is_error);
        state.tree.add_child(attach, origin_node);

        let root = state.tree.root();
        let folder_name = if is_error { "Errors" } else { "Warnings" };
        let folder = state.tree.ensure_folder(root, folder_name);
        let collected = Self::alloc_diagnostic(&mut state.tree, diag, is_error);
        state.tree.add_child(folder, collected);
        Ok(())
    }

    fn on_extended(
        &self,
        correlation: &Correlation,
        event_type: &str,
        fields: &[(String, String)],
        text: Option<&str>,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        let (attach, _) = self.resolve_origin(&state, correlation)?;
        let node = state.tree.alloc(NodeKind::Folder, event_type);
        state.tree.add_child(attach, node);
        Self::add_properties(&mut state.tree, node, fields);
        if let Some(text) = text {
            let message = state.tree.alloc(NodeKind::Message, text);
            state.tree.add_child(node, message);
        }
        Ok(())
    }

    fn on_blob(&self, name: &str, size: usize) -> Result<(), Error> {
        let mut state = self.state.lock();
        let root = state.tree.root();
        let folder = state.tree.ensure_folder(root, "Files");
        let item = state.tree.alloc(NodeKind::Item, name);
        state.tree.add_child(folder, item);
        let metadata = state.tree.alloc(
            NodeKind::Metadata {
                value: size.to_string(),
            },
            "Size",
        );
        state.tree.add_child(item, metadata);
        Ok(())
    }

    /// Get the project node for a context, creating an unattached stub on
    /// first reference so children can hang off it before its own start
    /// event arrives.
    fn project_node(&self, state: &mut TreeState, context_id: i32) -> NodeId {
        if let Some(existing) = self.projects.get(&context_id) {
            return *existing.value();
        }
        let id = state.tree.alloc(
            NodeKind::Project {
                project_file: String::new(),
                context_id,
            },
            "",
        );
        self.projects.insert(context_id, id);
        id
    }

    /// Like `project_node` but without allocating: falls back to the root
    /// for events with no usable context.
    fn project_node_existing(&self, state: &TreeState, context_id: i32) -> NodeId {
        self.projects
            .get(&context_id)
            .map(|e| *e.value())
            .unwrap_or_else(|| state.tree.root())
    }

    /// Resolve the target a correlated event belongs to, consulting the
    /// single-entry cache first. Must be called under the state lock.
    fn resolve_target(&self, state: &TreeState, correlation: &Correlation) -> Option<NodeId> {
        if !correlation.has_target() {
            return None;
        }
        let key = (correlation.project_context_id, correlation.target_id);
        if let Some((cached_key, id)) = state.last_target {
            if cached_key == key {
                return Some(id);
            }
        }
        self.targets.get(&key).map(|e| *e.value())
    }

    /// Resolve where a message/diagnostic attaches: task, else target, else
    /// project, else build root. A correlation naming an unknown task is a
    /// construction error — causal ordering within a context should have
    /// delivered the task start first.
    fn resolve_origin(
        &self,
        state: &TreeState,
        correlation: &Correlation,
    ) -> Result<(NodeId, Option<String>), Error> {
        if correlation.has_task() {
            let key = (correlation.project_context_id, correlation.task_id);
            let id = self.tasks.get(&key).map(|e| *e.value()).ok_or_else(|| {
                Error::Construction(format!("message for unknown task {}", correlation.task_id))
            })?;
            let task_name = state.tree.node(id).text.clone();
            return Ok((id, Some(task_name)));
        }
        if let Some(target) = self.resolve_target(state, correlation) {
            return Ok((target, None));
        }
        if correlation.has_project_context() {
            return Ok((
                self.project_node_existing(state, correlation.project_context_id),
                None,
            ));
        }
        Ok((state.tree.root(), None))
    }

    fn add_properties(tree: &mut BuildTree, parent: NodeId, pairs: &[(String, String)]) {
        for (name, value) in pairs {
            let property = tree.alloc(
                NodeKind::Property {
                    value: value.clone(),
                },
                name.clone(),
            );
            tree.add_child(parent, property);
        }
    }

    fn alloc_diagnostic(tree: &mut BuildTree, diag: &Diagnostic, is_error: bool) -> NodeId {
        let kind = if is_error {
            NodeKind::Error {
                code: diag.code.clone(),
                file: diag.file.clone(),
                line: diag.line,
                column: diag.column,
            }
        } else {
            NodeKind::Warning {
                code: diag.code.clone(),
                file: diag.file.clone(),
                line: diag.line,
                column: diag.column,
            }
        };
        tree.alloc(kind, diag.text.clone())
    }

    fn materialize(tree: &mut BuildTree, parent: NodeId, fragment: &Fragment) {
        let kind = match fragment.kind {
            FragmentKind::Parameter => NodeKind::Parameter,
            FragmentKind::Item => NodeKind::Item,
            FragmentKind::Metadata => NodeKind::Metadata {
                value: fragment.value.clone(),
            },
            FragmentKind::Property => NodeKind::Property {
                value: fragment.value.clone(),
            },
            FragmentKind::Folder => NodeKind::Folder,
            FragmentKind::Message => NodeKind::Message,
        };
        let id = tree.alloc(kind, fragment.text.clone());
        tree.add_child(parent, id);
        for child in &fragment.children {
            Self::materialize(tree, id, child);
        }
    }

    /// Finalization pass: attach orphan project stubs under the root, then
    /// reconcile unparented targets through the dependency graph.
    fn finalize(&self, state: &mut TreeState) {
        if state.finalized {
            return;
        }
        state.finalized = true;

        let orphan_projects: Vec<NodeId> = self
            .projects
            .iter()
            .map(|e| *e.value())
            .filter(|id| state.tree.parent(*id).is_none())
            .collect();
        let root = state.tree.root();
        for id in orphan_projects {
            state.tree.add_child(root, id);
        }

        let pending = std::mem::take(&mut state.pending_unparented);
        let mut graphs: FxHashMap<NodeId, Option<TargetGraph>> = FxHashMap::default();

        for (project, target) in pending {
            let graph = graphs
                .entry(project)
                .or_insert_with(|| self.project_graph(&state.tree, project));

            let target_name = state.tree.node(target).text.clone();
            let context_id = match state.tree.node(project).kind {
                NodeKind::Project { context_id, .. } => context_id,
                _ => girder_core::NO_ID,
            };

            let dependent = graph.as_ref().and_then(|g| {
                g.get_dependents(&target_name).iter().find_map(|candidate| {
                    self.targets_by_name
                        .get(&(context_id, candidate.to_lowercase()))
                        .map(|e| *e.value())
                })
            });

            match dependent {
                // The dependent may itself sit beneath this target (it named
                // it as parent_target when it started); nesting there would
                // cut both loose from the root.
                Some(parent) if !Self::is_beneath(&state.tree, parent, target) => {
                    tracing::debug!(
                        target = %target_name,
                        "attaching unparented target under its dependent"
                    );
                    state.tree.add_child(parent, target);
                }
                _ => {
                    state.tree.add_child(project, target);
                }
            }
        }
    }

    /// Whether `node` is `ancestor` or sits anywhere beneath it, following
    /// parent links.
    fn is_beneath(tree: &BuildTree, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = tree.parent(id);
        }
        false
    }

    /// Build the dependency graph for one project, if a provider is
    /// configured and knows the project.
    fn project_graph(&self, tree: &BuildTree, project: NodeId) -> Option<TargetGraph> {
        let provider = self.provider.as_ref()?;
        let project_file = match &tree.node(project).kind {
            NodeKind::Project { project_file, .. } => project_file.clone(),
            _ => return None,
        };
        let definitions = provider.target_definitions(&project_file);
        if definitions.is_empty() {
            return None;
        }
        Some(TargetGraph::from_definitions(
            &project_file,
            &definitions,
            provider.as_ref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_core::{TargetDefinition, NO_ID};

    fn ts(micros: i64) -> Timestamp {
        Timestamp::from_micros(micros)
    }

    fn project_correlation(context: i32) -> Correlation {
        Correlation {
            project_context_id: context,
            ..Correlation::none()
        }
    }

    fn target_correlation(context: i32, target: i32) -> Correlation {
        Correlation {
            project_context_id: context,
            target_id: target,
            ..Correlation::none()
        }
    }

    fn task_correlation(context: i32, target: i32, task: i32) -> Correlation {
        Correlation {
            project_context_id: context,
            target_id: target,
            task_id: task,
            ..Correlation::none()
        }
    }

    fn project_started(context: i32, file: &str) -> BuildEvent {
        BuildEvent::ProjectStarted {
            correlation: project_correlation(context),
            parent_project_context_id: NO_ID,
            timestamp: ts(10),
            project_file: file.to_string(),
            target_names: None,
            global_properties: Vec::new(),
            properties: Vec::new(),
        }
    }

    fn target_started(context: i32, target: i32, name: &str, parent: Option<&str>) -> BuildEvent {
        BuildEvent::TargetStarted {
            correlation: target_correlation(context, target),
            timestamp: ts(20),
            target_name: name.to_string(),
            parent_target: parent.map(str::to_string),
            source_file: None,
        }
    }

    struct FixedDeps(Vec<TargetDefinition>);

    impl DependencyProvider for FixedDeps {
        fn target_definitions(&self, _project_file: &str) -> Vec<TargetDefinition> {
            self.0.clone()
        }
    }

    #[test]
    fn test_full_build_sequence() {
        let builder = TreeBuilder::new(None);
        builder.handle(&BuildEvent::BuildStarted { timestamp: ts(1) });
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&target_started(1, 5, "Build", Some("Root")));
        builder.handle(&BuildEvent::TaskStarted {
            correlation: task_correlation(1, 5, 9),
            timestamp: ts(30),
            task_name: "Csc".to_string(),
            source_file: None,
            line: 0,
        });
        builder.handle(&BuildEvent::Message {
            correlation: task_correlation(1, 5, 9),
            timestamp: ts(31),
            importance: girder_codec::MessageImportance::Normal,
            text: "compiling".to_string(),
        });
        builder.handle(&BuildEvent::TaskFinished {
            correlation: task_correlation(1, 5, 9),
            timestamp: ts(40),
            task_name: "Csc".to_string(),
            succeeded: true,
        });
        builder.handle(&BuildEvent::TargetFinished {
            correlation: target_correlation(1, 5),
            timestamp: ts(50),
            target_name: "Build".to_string(),
            succeeded: true,
            outputs: Vec::new(),
        });
        builder.handle(&BuildEvent::ProjectFinished {
            project_context_id: 1,
            timestamp: ts(60),
            succeeded: true,
        });
        builder.handle(&BuildEvent::BuildFinished {
            timestamp: ts(70),
            succeeded: true,
        });

        let result = builder.finish();
        assert!(result.errors.is_empty());
        let tree = &result.tree;
        assert_eq!(tree.node(tree.root()).succeeded, Some(true));

        let project = tree
            .find_child(tree.root(), |n| n.text == "/src/app.csproj")
            .unwrap();
        assert_eq!(tree.node(project).succeeded, Some(true));
        // "Root" never started, so the target falls back under the project.
        let target = tree.find_child(project, |n| n.text == "Build").unwrap();
        let task = tree.find_child(target, |n| n.text == "Csc").unwrap();
        assert_eq!(tree.node(task).start, Some(ts(30)));
        assert_eq!(tree.node(task).end, Some(ts(40)));
        assert!(tree.find_child(task, |n| n.text == "compiling").is_some());
    }

    #[test]
    fn test_child_event_creates_project_stub() {
        let builder = TreeBuilder::new(None);
        // Target arrives before its project's start event.
        builder.handle(&target_started(3, 1, "Restore", Some("Top")));
        builder.handle(&project_started(3, "/src/lib.csproj"));

        let result = builder.finish();
        assert!(result.errors.is_empty());
        let tree = &result.tree;
        let project = tree
            .find_child(tree.root(), |n| n.text == "/src/lib.csproj")
            .unwrap();
        assert!(tree.find_child(project, |n| n.text == "Restore").is_some());
    }

    #[test]
    fn test_unparented_target_attaches_under_dependent() {
        let provider: Arc<dyn DependencyProvider> = Arc::new(FixedDeps(vec![
            TargetDefinition::new("B", "A"),
        ]));
        let builder = TreeBuilder::new(Some(provider));
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&target_started(1, 5, "B", Some("Top")));
        builder.handle(&target_started(1, 6, "A", None));

        let result = builder.finish();
        assert!(result.errors.is_empty());
        let tree = &result.tree;
        let project = tree
            .find_child(tree.root(), |n| n.text == "/src/app.csproj")
            .unwrap();
        let b = tree.find_child(project, |n| n.text == "B").unwrap();
        // B declared DependsOnTargets="A" and ran, so A nests under B.
        assert!(tree.find_child(b, |n| n.text == "A").is_some());
        assert!(tree.find_child(project, |n| n.text == "A").is_none());
    }

    #[test]
    fn test_dependent_beneath_target_falls_back_to_project() {
        let provider: Arc<dyn DependencyProvider> =
            Arc::new(FixedDeps(vec![TargetDefinition::new("B", "A")]));
        let builder = TreeBuilder::new(Some(provider));
        builder.handle(&project_started(1, "/src/app.csproj"));
        // A starts unparented; B then starts naming A as its parent, so B
        // already sits beneath A when finalization runs. Reparenting A
        // under B would detach the pair from the root.
        builder.handle(&target_started(1, 6, "A", None));
        builder.handle(&target_started(1, 5, "B", Some("A")));

        let result = builder.finish();
        assert!(result.errors.is_empty());
        let tree = &result.tree;
        let project = tree
            .find_child(tree.root(), |n| n.text == "/src/app.csproj")
            .unwrap();
        let a = tree.find_child(project, |n| n.text == "A").unwrap();
        assert!(tree.find_child(a, |n| n.text == "B").is_some());
        assert!(tree
            .find_descendant(tree.root(), |n| n.text == "B")
            .is_some());
    }

    #[test]
    fn test_sentinel_context_target_skips_phantom_project() {
        let builder = TreeBuilder::new(None);
        builder.handle(&target_started(NO_ID, 5, "Detached", None));

        let result = builder.finish();
        assert!(result.errors.is_empty());
        let tree = &result.tree;
        assert!(tree
            .find_child(tree.root(), |n| n.text == "Detached")
            .is_some());
        // No empty-named project stub minted for the sentinel context.
        assert!(tree
            .find_descendant(tree.root(), |n| matches!(
                n.kind,
                NodeKind::Project { .. }
            ))
            .is_none());
    }

    #[test]
    fn test_unparented_target_falls_back_to_project() {
        let builder = TreeBuilder::new(None);
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&target_started(1, 6, "A", None));

        let result = builder.finish();
        let tree = &result.tree;
        let project = tree
            .find_child(tree.root(), |n| n.text == "/src/app.csproj")
            .unwrap();
        assert!(tree.find_child(project, |n| n.text == "A").is_some());
    }

    #[test]
    fn test_diagnostics_are_dual_indexed() {
        let builder = TreeBuilder::new(None);
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&target_started(1, 5, "Build", Some("Top")));
        builder.handle(&BuildEvent::Warning(Diagnostic {
            correlation: target_correlation(1, 5),
            timestamp: ts(33),
            code: Some("CS0168".to_string()),
            file: Some("Program.cs".to_string()),
            line: 12,
            column: 9,
            text: "unused variable".to_string(),
        }));

        let result = builder.finish();
        assert!(result.errors.is_empty());
        let tree = &result.tree;
        let target = tree
            .find_descendant(tree.root(), |n| n.text == "Build")
            .unwrap();
        assert!(tree
            .find_child(target, |n| n.text == "unused variable")
            .is_some());

        let warnings = tree
            .find_child(tree.root(), |n| n.text == "Warnings")
            .unwrap();
        let collected = tree
            .find_child(warnings, |n| n.text == "unused variable")
            .unwrap();
        match &tree.node(collected).kind {
            NodeKind::Warning { code, line, .. } => {
                assert_eq!(code.as_deref(), Some("CS0168"));
                assert_eq!(*line, 12);
            }
            other => panic!("expected warning node, got {other:?}"),
        }
    }

    #[test]
    fn test_message_for_unknown_task_is_collected_not_fatal() {
        let builder = TreeBuilder::new(None);
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&BuildEvent::Message {
            correlation: task_correlation(1, 5, 99),
            timestamp: ts(5),
            importance: girder_codec::MessageImportance::Low,
            text: "orphan".to_string(),
        });
        builder.handle(&target_started(1, 5, "Build", Some("Top")));

        let result = builder.finish();
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], Error::Construction(_)));
        // Later events still applied.
        assert!(result
            .tree
            .find_descendant(result.tree.root(), |n| n.text == "Build")
            .is_some());
    }

    #[test]
    fn test_using_task_message_records_assembly() {
        let builder = TreeBuilder::new(None);
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&BuildEvent::Message {
            correlation: project_correlation(1),
            timestamp: ts(5),
            importance: girder_codec::MessageImportance::Low,
            text: "Using task \"Csc\" from assembly \"/usr/lib/Roslyn.dll\".".to_string(),
        });

        assert_eq!(
            builder.task_assembly("Csc"),
            Some("/usr/lib/Roslyn.dll".to_string())
        );
    }

    #[test]
    fn test_target_outputs_folder() {
        let builder = TreeBuilder::new(None);
        builder.handle(&project_started(1, "/src/app.csproj"));
        builder.handle(&target_started(1, 5, "Build", Some("Top")));
        builder.handle(&BuildEvent::TargetFinished {
            correlation: target_correlation(1, 5),
            timestamp: ts(50),
            target_name: "Build".to_string(),
            succeeded: true,
            outputs: vec![ItemPayload {
                spec: "bin/app.dll".to_string(),
                metadata: vec![("TargetPath".to_string(), "app.dll".to_string())],
            }],
        });

        let result = builder.finish();
        let tree = &result.tree;
        let outputs = tree
            .find_descendant(tree.root(), |n| n.text == "TargetOutputs")
            .unwrap();
        let item = tree.find_child(outputs, |n| n.text == "bin/app.dll").unwrap();
        let metadata = tree.find_child(item, |n| n.text == "TargetPath").unwrap();
        match &tree.node(metadata).kind {
            NodeKind::Metadata { value } => assert_eq!(value, "app.dll"),
            other => panic!("expected metadata node, got {other:?}"),
        }
    }

    #[test]
    fn test_blob_indexed_under_files_folder() {
        let builder = TreeBuilder::new(None);
        builder.handle(&BuildEvent::Blob {
            name: "msbuild.rsp".to_string(),
            bytes: vec![0u8; 42],
        });

        let result = builder.finish();
        let tree = &result.tree;
        let files = tree.find_child(tree.root(), |n| n.text == "Files").unwrap();
        let item = tree.find_child(files, |n| n.text == "msbuild.rsp").unwrap();
        let size = tree.find_child(item, |n| n.text == "Size").unwrap();
        match &tree.node(size).kind {
            NodeKind::Metadata { value } => assert_eq!(value, "42"),
            other => panic!("expected metadata node, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_without_build_finished_attaches_orphans() {
        let builder = TreeBuilder::new(None);
        // Stub project referenced only by a target, never started.
        builder.handle(&target_started(9, 1, "Compile", Some("Top")));

        let result = builder.finish();
        let tree = &result.tree;
        // The stub project hangs off the root after finalization.
        assert_eq!(tree.children(tree.root()).len(), 1);
        let project = tree.children(tree.root())[0];
        assert!(matches!(
            tree.node(project).kind,
            NodeKind::Project { context_id: 9, .. }
        ));
        assert!(tree.find_child(project, |n| n.text == "Compile").is_some());
    }
}
