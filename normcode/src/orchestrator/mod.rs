//! The Orchestrator: the top-level loop that scans the priority-ordered
//! Waitlist, dispatches ready inferences to their sequence handler,
//! folds the resulting `StepOutcome` back into the Blackboard/Workspace,
//! checkpoints, and detects termination (spec §4.6). Single writer, single
//! owner of both mutable stores — mirrors how the teacher's
//! `StateManager`/`Coordinator` own their stores exclusively rather than
//! sharing them behind a mutex (see spec §4.3, §5).

mod state;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use normstore::CheckpointStore;

use crate::blackboard::{Blackboard, CompletionDetail, ConceptStatus, InferenceStatus};
use crate::body::{BodyInterface, ParadigmSpec};
use crate::config::{CheckpointPolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::reference::{Cell, Reference, NONE_AXIS};
use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo, Sequence};
use crate::sequence::{self, StepContext};
use crate::workspace::Workspace;

pub use state::State;

/// Per-run overrides layered on top of [`EngineConfig`] at construction.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOpts {
    pub run_id: Option<String>,
    pub db_path: Option<PathBuf>,
    pub max_cycles: Option<u64>,
    pub checkpoint_policy: Option<CheckpointPolicy>,
    pub retry_body_errors: Option<bool>,
    /// Opaque paradigm specs, handed unexamined to `BodyInterface::call_paradigm`
    /// callers that want to look them up (spec §9: "the engine does not
    /// interpret paradigm contents beyond handing them to the Body").
    pub paradigms: std::collections::HashMap<String, ParadigmSpec>,
}

impl OrchestratorOpts {
    /// Build opts from a loaded [`EngineConfig`], substituting `run_id`
    /// into the configured `db_path_template` the same way the config
    /// itself does at `EngineConfig::db_path`.
    pub fn from_config(config: &EngineConfig, run_id: Option<String>) -> Self {
        let db_path = run_id.as_ref().map(|id| config.db_path(id));
        Self {
            run_id,
            db_path,
            max_cycles: Some(config.max_cycles),
            checkpoint_policy: Some(config.checkpoint_policy.clone()),
            retry_body_errors: Some(config.retry.retry_body_errors),
            paradigms: std::collections::HashMap::new(),
        }
    }
}

/// A completed final concept's name and immutable value, as returned by
/// `Orchestrator::run` on a `completed` run (spec §6.3, §7).
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedConcept {
    pub concept_name: String,
    pub reference: Reference,
}

/// One failed inference's flow_index and completion detail, surfaced on
/// `failed`/`stuck` runs (spec §7: "enumerates failed inferences with
/// their detail strings").
#[derive(Debug, Clone, PartialEq)]
pub struct FailedInference {
    pub flow_index: FlowIndex,
    pub detail: Option<CompletionDetail>,
}

/// The four terminal run states named in spec §7, plus `Paused` — a
/// pragmatic fifth state this implementation uses to support the
/// Pause/Resume/Step surface from spec §6.3, since pausing is not itself
/// one of the spec's named run-ending states. Documented as an Open
/// Question resolution in `DESIGN.md`.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { final_concepts: Vec<CompletedConcept> },
    Failed { failed: Vec<FailedInference> },
    Stuck { failed: Vec<FailedInference>, reason: String },
    Cancelled,
    Paused,
}

/// The result of advancing one full waitlist scan via `Orchestrator::step`.
#[derive(Debug, Clone)]
pub enum StepResult {
    Progressed,
    Done(RunOutcome),
}

/// Top-level orchestration loop over a single run.
pub struct Orchestrator {
    concepts: ConceptRepo,
    inferences: InferenceRepo,
    body: Arc<dyn BodyInterface>,
    #[allow(dead_code)]
    paradigms: std::collections::HashMap<String, ParadigmSpec>,

    blackboard: Blackboard,
    workspace: Workspace,
    waitlist: Vec<FlowIndex>,

    run_id: String,
    cycle: u64,
    inference_count: u64,
    max_cycles: u64,
    checkpoint_policy: CheckpointPolicy,
    retry_body_errors: bool,
    retried: HashSet<FlowIndex>,

    store: Option<CheckpointStore>,
    checkpoint_failures: u32,

    breakpoints: HashSet<FlowIndex>,
    paused: bool,
    paused_at: Option<FlowIndex>,
    suppressed_breakpoint: Option<FlowIndex>,
    stop_requested: bool,
}

impl Orchestrator {
    /// Construct a fresh Orchestrator: ground concepts become `complete`
    /// with their `initial_data`, every other concept `pending`, every
    /// inference `pending`, Workspace empty (spec §4.6 Initialization).
    pub fn new(concepts: ConceptRepo, inferences: InferenceRepo, body: Arc<dyn BodyInterface>, opts: OrchestratorOpts) -> Result<Self> {
        let store = match &opts.db_path {
            Some(path) => Some(CheckpointStore::open(path)?),
            None => None,
        };
        Self::build(concepts, inferences, body, opts, store)
    }

    fn build(
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        body: Arc<dyn BodyInterface>,
        opts: OrchestratorOpts,
        store: Option<CheckpointStore>,
    ) -> Result<Self> {
        let mut blackboard = Blackboard::new();
        for concept in concepts.all_concepts() {
            if concept.is_ground() {
                let reference = concept
                    .initial_reference()
                    .expect("is_ground_concept implies initial_reference is Some");
                blackboard.set_concept_value(&concept.concept_name, reference);
            } else {
                blackboard.mark_pending(&concept.concept_name);
            }
        }

        let waitlist: Vec<FlowIndex> = inferences.all_inferences_sorted().into_iter().map(|i| i.flow_index()).collect();

        Ok(Self {
            concepts,
            inferences,
            body,
            paradigms: opts.paradigms,
            blackboard,
            workspace: Workspace::new(),
            waitlist,
            run_id: opts.run_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            cycle: 0,
            inference_count: 0,
            max_cycles: opts.max_cycles.unwrap_or(1000),
            checkpoint_policy: opts.checkpoint_policy.unwrap_or_default(),
            retry_body_errors: opts.retry_body_errors.unwrap_or(true),
            retried: HashSet::new(),
            store,
            checkpoint_failures: 0,
            breakpoints: HashSet::new(),
            paused: false,
            paused_at: None,
            suppressed_breakpoint: None,
            stop_requested: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Drive the run to completion, one waitlist scan (`step`) at a time.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        loop {
            if self.paused {
                self.checkpoint()?;
                return Ok(RunOutcome::Paused);
            }
            if let StepResult::Done(outcome) = self.step().await? {
                return Ok(outcome);
            }
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if let Some(flow_index) = self.paused_at.take() {
            self.suppressed_breakpoint = Some(flow_index);
        }
        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn set_breakpoint(&mut self, flow_index: FlowIndex) {
        self.breakpoints.insert(flow_index);
    }

    pub fn clear_breakpoint(&mut self, flow_index: &FlowIndex) {
        self.breakpoints.remove(flow_index);
    }

    pub fn snapshot_state(&self) -> State {
        State {
            blackboard: self.blackboard.clone(),
            workspace: self.workspace.clone(),
            cycle: self.cycle,
            inference_count: self.inference_count,
        }
    }

    fn hydrate(&mut self, state: State) {
        self.blackboard = state.blackboard;
        self.workspace = state.workspace;
        self.cycle = state.cycle;
        self.inference_count = state.inference_count;
    }

    /// Construct a fresh Orchestrator and hydrate it from a checkpoint
    /// (the latest one for `run_id`, or the one at/before `cycle` if
    /// given) — spec §4.5 "Resume".
    pub fn load_checkpoint(
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        body: Arc<dyn BodyInterface>,
        db_path: impl AsRef<Path>,
        run_id: &str,
        cycle: Option<i64>,
        mut opts: OrchestratorOpts,
    ) -> Result<Self> {
        let store = CheckpointStore::open(db_path.as_ref())?;
        let row = match cycle {
            Some(c) => store.load_at(run_id, c, None)?,
            None => store.load_latest(run_id)?,
        };
        let state: State = normstore::from_canonical_json(&row.state_json).map_err(EngineError::CheckpointIo)?;

        opts.run_id = Some(run_id.to_string());
        let mut orch = Self::build(concepts, inferences, body, opts, Some(store))?;
        orch.hydrate(state);
        Ok(orch)
    }

    /// Copy `source_run_id`'s checkpoint history (optionally truncated at
    /// `cycle`) into `new_run_id`, then construct an Orchestrator hydrated
    /// from it. Subsequent writes to either run diverge (spec §4.5 "Fork").
    pub fn fork_checkpoint(
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        body: Arc<dyn BodyInterface>,
        db_path: impl AsRef<Path>,
        source_run_id: &str,
        new_run_id: &str,
        cycle: Option<i64>,
        opts: OrchestratorOpts,
    ) -> Result<Self> {
        {
            // Dropped before `load_checkpoint` reopens the file, releasing
            // the advisory lock `CheckpointStore::open` takes.
            let store = CheckpointStore::open(db_path.as_ref())?;
            store.fork(source_run_id, cycle, new_run_id)?;
        }
        Self::load_checkpoint(concepts, inferences, body, db_path, new_run_id, cycle, opts)
    }

    /// Advance one full priority-ordered waitlist scan (spec §4.6 Main loop
    /// body, one iteration of the outer `while`).
    pub async fn step(&mut self) -> Result<StepResult> {
        if self.stop_requested {
            self.checkpoint()?;
            return Ok(StepResult::Done(RunOutcome::Cancelled));
        }
        if self.cycle >= self.max_cycles {
            return Ok(StepResult::Done(RunOutcome::Stuck {
                failed: self.failed_inferences(),
                reason: format!("max_cycles ({}) reached with no terminal state", self.max_cycles),
            }));
        }

        let mut progressed = false;

        for flow_index in self.waitlist.clone() {
            if self.stop_requested {
                break;
            }

            if self.breakpoints.contains(&flow_index) && self.suppressed_breakpoint.as_ref() != Some(&flow_index) {
                self.paused = true;
                self.paused_at = Some(flow_index.clone());
                break;
            }
            if self.suppressed_breakpoint.as_ref() == Some(&flow_index) {
                self.suppressed_breakpoint = None;
            }

            if self.blackboard.status_of_inference(&flow_index) != InferenceStatus::Pending {
                continue;
            }

            let inference = self.inferences.get_inference(&flow_index)?.clone();

            let inputs_complete = inference
                .value_concepts
                .iter()
                .chain(inference.context_concepts.iter())
                .all(|name| self.blackboard.status_of_concept(name) == ConceptStatus::Complete);
            if !inputs_complete {
                continue;
            }

            let (ready, skip) = self.timing_readiness(&flow_index);
            if !ready {
                continue;
            }
            if skip && inference.sequence != Sequence::Timing {
                self.apply_skip(&inference, &flow_index);
                progressed = true;
                continue;
            }

            progressed |= self.dispatch_one(&inference, &flow_index).await?;
        }

        if self.stop_requested {
            self.checkpoint()?;
            return Ok(StepResult::Done(RunOutcome::Cancelled));
        }

        self.cycle += 1;
        if self.checkpoint_policy == CheckpointPolicy::EveryCycle {
            self.checkpoint()?;
        }

        if !progressed {
            return Ok(StepResult::Done(self.terminal_outcome()));
        }

        Ok(StepResult::Progressed)
    }

    /// Readiness aggregation over `flow_index`'s timing children (spec
    /// §4.6 "Readiness" / §4.4.3): `ready` is AND across every timing
    /// child's verdict (and `false` until every child has reported one at
    /// all); `to_be_skipped` is OR across children that request a skip.
    fn timing_readiness(&self, flow_index: &FlowIndex) -> (bool, bool) {
        let children = self.inferences.timing_children(flow_index);
        if children.is_empty() {
            return (true, false);
        }
        let mut ready = true;
        let mut skip = false;
        for child in children {
            match self.blackboard.timing_gate(&child.flow_index()) {
                Some(gate) => {
                    ready &= gate.ready;
                    skip |= gate.to_be_skipped;
                }
                None => ready = false,
            }
        }
        (ready, skip)
    }

    /// Dispatch one ready inference to its handler and fold the outcome
    /// back into Blackboard/Workspace. Returns whether this dispatch
    /// counts as scheduler progress.
    async fn dispatch_one(&mut self, inference: &Inference, flow_index: &FlowIndex) -> Result<bool> {
        let started_at = chrono::Utc::now().timestamp_millis();
        self.blackboard.set_inference_started(flow_index);

        let ctx = StepContext {
            inference,
            flow_index: flow_index.clone(),
            concepts: &self.concepts,
            inferences: &self.inferences,
            blackboard: &mut self.blackboard,
            workspace: &mut self.workspace,
            body: self.body.as_ref(),
        };

        self.inference_count += 1;

        match sequence::dispatch(ctx).await {
            Ok(outcome) => {
                let detail = outcome.completion_detail.clone();
                self.apply_outcome(inference, flow_index, outcome);
                self.record_execution(flow_index, "complete", detail_string(detail.as_ref()), None, started_at);
                self.maybe_checkpoint_after_dispatch()?;
                Ok(true)
            }
            Err(EngineError::BodyError(message)) => {
                let retriable = inference
                    .working_interpretation
                    .get("retriable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if self.retry_body_errors && retriable && self.retried.insert(flow_index.clone()) {
                    tracing::warn!(%flow_index, %message, "retrying body error once");
                    self.blackboard.set_inference_pending(flow_index);
                } else {
                    self.blackboard.set_inference_failed(flow_index, message.clone());
                    self.record_execution(flow_index, "failed", None, Some(message), started_at);
                }
                Ok(true)
            }
            Err(error) => {
                let message = error.to_string();
                self.blackboard.set_inference_failed(flow_index, message.clone());
                self.record_execution(flow_index, "failed", None, Some(message), started_at);
                Ok(true)
            }
        }
    }

    fn apply_outcome(&mut self, inference: &Inference, flow_index: &FlowIndex, outcome: sequence::StepOutcome) {
        if let Some((ready, skip)) = outcome.timing_gate {
            self.blackboard.set_timing_gate(flow_index, ready, skip);
            if outcome.done {
                self.blackboard
                    .set_inference_complete(flow_index, outcome.completion_detail.unwrap_or(CompletionDetail::Success));
            } else {
                self.blackboard.set_inference_pending(flow_index);
            }
            return;
        }

        if let Some((primary, secondary)) = &outcome.alias {
            self.blackboard.add_alias(primary, secondary);
        }
        if let Some(mask) = outcome.truth_mask {
            self.blackboard.set_truth_mask(&inference.concept_to_infer, mask);
        }

        if !outcome.done {
            // Looping mid-iteration: progress was recorded in the
            // Workspace but the output concept is not ready yet —
            // reschedule this inference for the next waitlist scan.
            self.blackboard.set_inference_pending(flow_index);
            return;
        }

        if let Some(output) = outcome.output {
            self.blackboard.set_concept_value(&inference.concept_to_infer, output);
        }
        self.blackboard
            .set_inference_complete(flow_index, outcome.completion_detail.unwrap_or(CompletionDetail::Success));
    }

    /// Skip propagation (spec §4.6): the parent's `concept_to_infer`
    /// transitions straight to `complete` with a designated empty
    /// reference, shaped from the concept's declared axes.
    fn apply_skip(&mut self, inference: &Inference, flow_index: &FlowIndex) {
        self.blackboard.set_inference_skipped(flow_index);
        let empty = self.empty_reference_for(&inference.concept_to_infer);
        self.blackboard.set_concept_value(&inference.concept_to_infer, empty);
    }

    fn empty_reference_for(&self, concept_name: &str) -> Reference {
        match self.concepts.get_concept(concept_name) {
            Ok(concept) if !concept.reference_axis_names.is_empty() => {
                let shape = vec![0; concept.reference_axis_names.len()];
                Reference::new(concept.reference_axis_names.clone(), shape, vec![])
                    .expect("empty data always matches an all-zero shape")
            }
            _ => Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![Cell::Skip]).expect("singleton shape is always valid"),
        }
    }

    fn final_concept_names(&self) -> Vec<String> {
        self.concepts.all_concepts().filter(|c| c.is_final()).map(|c| c.concept_name.clone()).collect()
    }

    fn snapshot_final_concepts(&mut self) -> Vec<CompletedConcept> {
        let names = self.final_concept_names();
        names
            .into_iter()
            .filter_map(|name| {
                if self.blackboard.status_of_concept(&name) == ConceptStatus::Complete {
                    self.blackboard
                        .value_of_concept(&name)
                        .ok()
                        .map(|reference| CompletedConcept { concept_name: name, reference })
                } else {
                    None
                }
            })
            .collect()
    }

    fn failed_inferences(&self) -> Vec<FailedInference> {
        self.waitlist
            .iter()
            .filter(|fi| self.blackboard.status_of_inference(fi) == InferenceStatus::Failed)
            .map(|fi| FailedInference {
                flow_index: fi.clone(),
                detail: self.blackboard.completion_detail_of(fi).cloned(),
            })
            .collect()
    }

    fn terminal_outcome(&mut self) -> RunOutcome {
        let failed = self.failed_inferences();
        if !failed.is_empty() {
            return RunOutcome::Failed { failed };
        }
        let names = self.final_concept_names();
        let all_complete = names
            .iter()
            .all(|name| self.blackboard.status_of_concept(name) == ConceptStatus::Complete);
        if all_complete {
            RunOutcome::Completed { final_concepts: self.snapshot_final_concepts() }
        } else {
            RunOutcome::Stuck { failed, reason: format!("no waitlist progress after {} cycles", self.cycle) }
        }
    }

    fn maybe_checkpoint_after_dispatch(&mut self) -> Result<()> {
        if let CheckpointPolicy::EveryNInferences(n) = &self.checkpoint_policy {
            let n = *n;
            if n > 0 && self.inference_count % n == 0 {
                self.checkpoint()?;
            }
        }
        Ok(())
    }

    /// Persist a checkpoint. Logged-and-continue on a single failure (spec
    /// §7 `CheckpointIO`); three consecutive failures are surfaced as
    /// fatal to the caller.
    fn checkpoint(&mut self) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let snapshot = self.snapshot_state();
        let json = normstore::to_canonical_json(&snapshot).map_err(EngineError::CheckpointIo)?;
        let created_at = chrono::Utc::now().timestamp_millis();
        match store.checkpoint(&self.run_id, self.cycle as i64, self.inference_count as i64, &json, created_at) {
            Ok(()) => {
                self.checkpoint_failures = 0;
                Ok(())
            }
            Err(error) => {
                self.checkpoint_failures += 1;
                tracing::warn!(run_id = %self.run_id, %error, failures = self.checkpoint_failures, "checkpoint write failed");
                if self.checkpoint_failures >= 3 {
                    Err(EngineError::CheckpointIo(error))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn record_execution(
        &self,
        flow_index: &FlowIndex,
        status: &str,
        detail: Option<String>,
        error_text: Option<String>,
        started_at: i64,
    ) {
        let Some(store) = &self.store else { return };
        let row = normstore::ExecutionRow {
            run_id: self.run_id.clone(),
            cycle: self.cycle as i64,
            flow_index: flow_index.to_string(),
            started_at,
            completed_at: Some(chrono::Utc::now().timestamp_millis()),
            status: status.to_string(),
            detail,
            error_text,
        };
        if let Err(error) = store.record_execution(&row) {
            tracing::warn!(%error, "failed to record execution row");
        }
    }
}

fn detail_string(detail: Option<&CompletionDetail>) -> Option<String> {
    detail.map(|d| match d {
        CompletionDetail::Success => "success".to_string(),
        CompletionDetail::ConditionNotMet => "condition_not_met".to_string(),
        CompletionDetail::Skipped => "skipped".to_string(),
        CompletionDetail::Error(message) => message.clone(),
    })
}
