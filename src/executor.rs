//! Request-level orchestration: compile the filter, bind this invocation's
//! arguments, plan the projection and run the pipeline.

use serde_json::{Map, Value};

use crate::compiler::ConditionCompiler;
use crate::condition::{FilterContext, QueryBackend};
use crate::config::{FilterConfig, ProjectionPolicy};
use crate::errors::Error;
use crate::model::FilterRequest;
use crate::projection::errors::ProjectionDefinitionError;
use crate::projection::{run_plan, CancelToken, DataSource, ProjectionPlanner};

/// Executes complete filter requests. Condition-only callers (no projection)
/// use [`ConditionCompiler::compile`] and their context's `to_resolver`
/// directly; this type owns the full compile-plan-run path.
pub struct QueryExecutor<B: QueryBackend> {
    compiler: ConditionCompiler<B>,
    projection_policy: ProjectionPolicy,
    filter_config: FilterConfig,
}

impl<B: QueryBackend> QueryExecutor<B> {
    pub fn new(
        compiler: ConditionCompiler<B>,
        projection_policy: ProjectionPolicy,
        filter_config: FilterConfig,
    ) -> Self {
        QueryExecutor {
            compiler,
            projection_policy,
            filter_config,
        }
    }

    pub fn compiler(&self) -> &ConditionCompiler<B> {
        &self.compiler
    }

    /// Execute a request against `dto`'s projection metadata. The data
    /// source is acquired at pipeline step 1 and released on every exit
    /// path; `cancel` is honored between steps and batches.
    pub fn execute<S: DataSource<B>>(
        &self,
        request: &FilterRequest,
        dto: &str,
        context: &dyn FilterContext<B>,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Result<Vec<Map<String, Value>>, Error> {
        let projection = request.projection().ok_or_else(|| {
            ProjectionDefinitionError::MalformedPath {
                path: String::new(),
                reason: "request has no projection".to_string(),
            }
        })?;

        let compiled = self.compiler.compile(request, context)?;
        let params = compiled.params(request, self.filter_config)?;
        let resolver = context.to_resolver((**compiled.condition()).clone(), params);

        let planner = ProjectionPlanner::new(self.projection_policy);
        let plan = planner.plan(dto, projection, request.pagination())?;

        run_plan(&plan, Some(&resolver), request.pagination(), source, cancel)
    }
}
