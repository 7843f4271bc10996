//! Trait seams for external collaborators.

/// A target declared by a project, with its raw depends-on expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefinition {
    /// Target name as declared
    pub name: String,
    /// Raw depends-on expression (`;`/whitespace-separated names, possibly
    /// containing property references the provider can expand)
    pub depends_on: String,
}

impl TargetDefinition {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, depends_on: impl Into<String>) -> Self {
        TargetDefinition {
            name: name.into(),
            depends_on: depends_on.into(),
        }
    }
}

/// Supplies per-project target dependency data.
///
/// The build-tool integration layer implements this; the core never reaches
/// into engine internals itself. Implementations must be shareable across
/// the threads delivering events.
pub trait DependencyProvider: Send + Sync {
    /// Target definitions declared by the given project file.
    ///
    /// An empty vector means "no dependency data available" and disables
    /// dependency-shaped reattachment for that project.
    fn target_definitions(&self, project_file: &str) -> Vec<TargetDefinition>;

    /// Expand property references inside a depends-on expression.
    ///
    /// The default implementation returns the expression unchanged, which is
    /// correct for providers that pre-expand their definitions.
    fn expand(&self, _project_file: &str, expression: &str) -> String {
        expression.to_string()
    }
}
