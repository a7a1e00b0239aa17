//! Brownfield extraction: controller state to a replayable document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use catalyst_core::{ErrorKind, Record, ResourceKind, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::Context;
use crate::diff::{values_match, Compare};
use crate::error::{EngineError, Result};
use crate::outcome::{Diagnostic, Operation, Outcome};
use crate::reconciler::{Reconciler, Registry};

/// A filter: desired-field names to expected values.
pub type Filter = Map<String, Value>;

/// Per-component selection and filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentFilters {
    /// Components to extract.
    #[serde(default)]
    pub components_list: Vec<String>,

    /// Filters keyed by component name. A record matching any filter of its
    /// component is kept.
    #[serde(flatten)]
    pub filters: BTreeMap<String, Vec<Filter>>,
}

/// What to extract and where to write it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractRequest {
    /// Output file. A timestamped name is generated when absent.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Extract every component, ignoring all filters.
    #[serde(default)]
    pub generate_all_configurations: bool,

    /// Filters applied to every component whose records carry the field.
    #[serde(default)]
    pub global_filters: Filter,

    /// Component selection and component filters.
    #[serde(default)]
    pub component_specific_filters: ComponentFilters,
}

impl ExtractRequest {
    /// The components to extract, in dependency order.
    ///
    /// # Errors
    ///
    /// Returns `Document` for an unknown component or an empty selection.
    pub fn components(&self) -> Result<Vec<ResourceKind>> {
        if self.generate_all_configurations {
            return Ok(ResourceKind::ALL
                .into_iter()
                .filter(|k| k.component().is_some())
                .collect());
        }

        let selected = &self.component_specific_filters;
        let names = selected
            .components_list
            .iter()
            .chain(selected.filters.keys());
        let mut kinds = Vec::new();
        for name in names {
            let kind = ResourceKind::from_component(name)
                .ok_or_else(|| EngineError::Document(format!("unknown component: {name}")))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Err(EngineError::Document(
                "no components selected; set components_list or generate_all_configurations"
                    .to_string(),
            ));
        }
        kinds.sort_by_key(|k| k.rank());
        Ok(kinds)
    }

    fn keeps(&self, reconciler: &dyn Reconciler, record: &Record) -> bool {
        if self.generate_all_configurations {
            return true;
        }

        let carried = |field: &str| reconciler.reverse_map().iter().any(|f| f.desired == field);
        let global_ok = self
            .global_filters
            .iter()
            .filter(|(field, _)| carried(field))
            .all(|(field, want)| matches_value(record, field, want));

        let component_ok = reconciler
            .kind()
            .component()
            .and_then(|name| self.component_specific_filters.filters.get(name))
            .filter(|filters| !filters.is_empty())
            .map_or(true, |filters| {
                filters.iter().any(|filter| {
                    filter
                        .iter()
                        .all(|(field, want)| matches_value(record, field, want))
                })
            });

        global_ok && component_ok
    }
}

fn matches_value(record: &Record, field: &str, want: &Value) -> bool {
    record
        .get(field)
        .is_some_and(|have| values_match(have, want, Compare::Exact))
}

/// How a component fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Every record was extracted.
    Success,
    /// Some records could not be converted.
    Partial,
    /// Nothing could be extracted.
    Failed,
}

/// Result of extracting one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    /// Component name.
    pub component: String,
    /// Overall status.
    pub status: ComponentStatus,
    /// Records written to the document.
    pub extracted: usize,
    /// Records that could not be converted.
    pub failed: usize,
    /// Error messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Extracted records of one component.
#[derive(Debug, Clone)]
pub struct ComponentRecords {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Desired records, in controller order.
    pub records: Vec<Record>,
    /// Summary for the aggregate.
    pub summary: ComponentSummary,
}

/// The result of an extraction, before it is written.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Per-component results, in dependency order.
    pub components: Vec<ComponentRecords>,
}

impl Extraction {
    /// The replayable document.
    #[must_use]
    pub fn document(&self) -> Value {
        let config: Vec<Value> = self
            .components
            .iter()
            .filter(|c| !c.records.is_empty())
            .map(|c| {
                let records: Vec<Value> = c.records.iter().cloned().map(Record::into_value).collect();
                let mut group = Map::new();
                group.insert(c.kind.as_str().to_string(), Value::Array(records));
                Value::Object(group)
            })
            .collect();
        json!({ "state": State::Merged, "config": config })
    }

    /// Component summaries.
    #[must_use]
    pub fn summaries(&self) -> Vec<ComponentSummary> {
        self.components.iter().map(|c| c.summary.clone()).collect()
    }

    /// Returns true if every component failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.summary.status == ComponentStatus::Failed)
    }

    /// Write the document as YAML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `Output` if the document cannot be encoded or written.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let output_error = |message: String| EngineError::Output {
            path: path.display().to_string(),
            message,
        };
        let text = serde_yaml::to_string(&self.document()).map_err(|e| output_error(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| output_error(e.to_string()))?;
        }
        tokio::fs::write(path, text)
            .await
            .map_err(|e| output_error(e.to_string()))?;
        tracing::info!(path = %path.display(), "Wrote extracted document");
        Ok(())
    }
}

/// Default file name for an extracted document.
#[must_use]
pub fn default_file_name() -> String {
    format!(
        "catalyst_center_workflow_manager_playbook_{}.yml",
        chrono::Local::now().format("%d_%b_%Y_%H_%M_%S_%3f")
    )
}

/// Reads controller inventory back into desired records.
pub struct Extractor<'a> {
    registry: &'a Registry,
    ctx: &'a Context,
}

impl<'a> Extractor<'a> {
    /// Create an extractor.
    #[must_use]
    pub const fn new(registry: &'a Registry, ctx: &'a Context) -> Self {
        Self { registry, ctx }
    }

    /// Extract the requested components.
    ///
    /// A failing component is recorded in its summary and does not stop the
    /// others.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the component selection is invalid.
    pub async fn extract(&self, request: &ExtractRequest) -> Result<Extraction> {
        let mut components = Vec::new();
        for kind in request.components()? {
            let Some(reconciler) = self.registry.get(kind) else {
                continue;
            };
            components.push(self.component(request, reconciler.as_ref()).await);
        }
        Ok(Extraction { components })
    }

    async fn component(&self, request: &ExtractRequest, reconciler: &dyn Reconciler) -> ComponentRecords {
        let kind = reconciler.kind();
        let name = kind.component().unwrap_or(kind.as_str()).to_string();

        let listed = match self.ctx.sites().await {
            Ok(sites) => reconciler
                .list_current(self.ctx)
                .await
                .map(|records| (records, sites.lookups())),
            Err(e) => Err(e),
        };
        let (current, lookups) = match listed {
            Ok(listed) => listed,
            Err(e) => {
                tracing::warn!(component = %name, error = %e, "Component extraction failed");
                return ComponentRecords {
                    kind,
                    records: Vec::new(),
                    summary: ComponentSummary {
                        component: name,
                        status: ComponentStatus::Failed,
                        extracted: 0,
                        failed: 0,
                        errors: vec![e.to_string()],
                    },
                };
            }
        };

        let mut records = Vec::new();
        let mut errors = Vec::new();
        for record in &current {
            match reconciler.reverse(record, &lookups) {
                Ok(desired) if request.keeps(reconciler, &desired) => records.push(desired),
                Ok(_) => {}
                Err(e) => errors.push(format!("{}: {e}", describe_current(record))),
            }
        }

        let status = match (errors.is_empty(), records.is_empty()) {
            (true, _) => ComponentStatus::Success,
            (false, false) => ComponentStatus::Partial,
            (false, true) => ComponentStatus::Failed,
        };
        tracing::info!(
            component = %name,
            listed = current.len(),
            extracted = records.len(),
            failed = errors.len(),
            "Extracted component"
        );

        ComponentRecords {
            kind,
            summary: ComponentSummary {
                component: name,
                status,
                extracted: records.len(),
                failed: errors.len(),
                errors,
            },
            records,
        }
    }

    /// Extract, write the document and summarise the result as one outcome.
    pub async fn gather(&self, request: &ExtractRequest) -> Outcome {
        let extraction = match self.extract(request).await {
            Ok(extraction) => extraction,
            Err(e) => {
                return Outcome::failed(
                    "brownfield extraction",
                    None,
                    Diagnostic::from_error("brownfield extraction", "extract", &e),
                )
            }
        };

        let path = request
            .file_path
            .clone()
            .unwrap_or_else(|| self.ctx.config().output_dir.join(default_file_name()));
        let resource = path.display().to_string();

        let diagnostics: Vec<Diagnostic> = extraction
            .components
            .iter()
            .flat_map(|c| {
                c.summary.errors.iter().map(move |message| {
                    let kind = if c.summary.status == ComponentStatus::Failed && c.summary.failed == 0 {
                        ErrorKind::TransportError
                    } else {
                        ErrorKind::MissingReference
                    };
                    Diagnostic::new(kind, c.summary.component.as_str(), "extract", message.as_str())
                })
            })
            .collect();

        let mut outcome = if extraction.all_failed() {
            Outcome::new(resource, None, Operation::Failed)
        } else {
            match extraction.write(&path).await {
                Ok(()) => Outcome::new(resource, None, Operation::Created),
                Err(e) => Outcome::failed(
                    resource.clone(),
                    None,
                    Diagnostic::from_error(&resource, "write", &e),
                ),
            }
        };
        outcome.diagnostics.extend(diagnostics);
        outcome.with_response(json!({
            "file_path": path.display().to_string(),
            "components": extraction.summaries(),
        }))
    }
}

fn describe_current(record: &Record) -> String {
    ["nameHierarchy", "name", "ssid", "ipAddress", "displayName", "id"]
        .iter()
        .find_map(|field| record.get_str(field))
        .unwrap_or("record")
        .to_string()
}
