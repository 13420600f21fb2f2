//! # Testing CLI: evaluate a control's samples offline.
//!
//! ```bash
//! audit testing evaluate itgc-ac-01.yaml --inputs inputs.yaml --rule zero-tolerance
//! ```
//!
//! The detail file holds the control reference data (overview, procedure,
//! snapshot and samples). The optional inputs file holds auditor input per
//! sample; a sample listed there counts as opened, so every rule it does
//! not mention gets a default input.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use audit_core::SampleId;
use audit_testing::{
    aggregate, check_readiness, Conclusion, ConclusionRule, ControlFullDetail, Readiness,
    SampleFinalStatus, SampleInputs, SampleProgress, SystemResult, TestingSummary,
};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::{print_json, read_document, OutputFormat};

/// Testing subcommand arguments.
#[derive(Args, Debug)]
pub struct TestingArgs {
    #[command(subcommand)]
    pub command: TestingCommand,
}

/// Available testing subcommands.
#[derive(Subcommand, Debug)]
pub enum TestingCommand {
    /// Resolve every sample, aggregate, and conclude when complete.
    Evaluate {
        /// Control reference data (YAML, or JSON by extension).
        detail: PathBuf,

        /// Auditor inputs and final decisions per sample.
        #[arg(long)]
        inputs: Option<PathBuf>,

        /// Conclusion rule: deficiency-rate or zero-tolerance.
        #[arg(long, default_value = "deficiency-rate")]
        rule: ConclusionRule,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Auditor state for a control, as read from an inputs file.
#[derive(Debug, Default, Deserialize)]
pub struct InputsDocument {
    #[serde(default)]
    pub inputs: BTreeMap<SampleId, SampleInputs>,
    #[serde(default)]
    pub final_decisions: BTreeMap<SampleId, SystemResult>,
}

#[derive(Debug, Serialize)]
pub struct SampleOutcome {
    pub sample_id: SampleId,
    pub system_result: SystemResult,
    pub status: SampleFinalStatus,
}

#[derive(Debug, Serialize)]
pub struct Evaluation {
    pub control_code: String,
    pub readiness: Readiness,
    pub samples: Vec<SampleOutcome>,
    pub summary: TestingSummary,
    pub samples_tested: SampleProgress,
    pub failure_rate: f64,
    pub rule: ConclusionRule,
    /// `None` while any sample is NOT TESTED.
    pub conclusion: Option<Conclusion>,
}

/// Execute the testing subcommand.
pub fn run_testing(args: &TestingArgs) -> Result<u8> {
    match &args.command {
        TestingCommand::Evaluate {
            detail,
            inputs,
            rule,
            format,
        } => run_evaluate(detail, inputs.as_deref(), *rule, *format),
    }
}

fn run_evaluate(
    detail_path: &Path,
    inputs_path: Option<&Path>,
    rule: ConclusionRule,
    format: OutputFormat,
) -> Result<u8> {
    let detail: ControlFullDetail = read_document(detail_path)?;
    let inputs = match inputs_path {
        Some(path) => read_document(path)?,
        None => InputsDocument::default(),
    };
    for sample_id in inputs.inputs.keys().chain(inputs.final_decisions.keys()) {
        if detail.sample(sample_id).is_none() {
            tracing::warn!(sample_id = %sample_id, "inputs reference an unknown sample");
        }
    }

    let evaluation = evaluate(&detail, inputs, rule);
    tracing::info!(
        control = %evaluation.control_code,
        tested = %evaluation.samples_tested,
        "samples evaluated"
    );

    match format {
        OutputFormat::Json => print_json(&evaluation)?,
        OutputFormat::Text => print!("{}", render_evaluation(&evaluation)),
    }
    Ok(0)
}

/// Resolve every sample of `detail` against the given auditor state.
pub fn evaluate(detail: &ControlFullDetail, mut inputs: InputsDocument, rule: ConclusionRule) -> Evaluation {
    let check_ids = detail.procedure.check_ids();
    for sample_inputs in inputs.inputs.values_mut() {
        for id in &check_ids {
            sample_inputs.entry(*id).or_default();
        }
    }

    let samples: Vec<SampleOutcome> = detail
        .samples
        .iter()
        .map(|sample| SampleOutcome {
            sample_id: sample.sample_id.clone(),
            system_result: detail.procedure.system_result(sample),
            status: detail.procedure.resolve(
                sample,
                inputs.inputs.get(&sample.sample_id),
                inputs.final_decisions.get(&sample.sample_id).copied(),
            ),
        })
        .collect();

    let statuses: Vec<SampleFinalStatus> = samples.iter().map(|s| s.status).collect();
    let summary = aggregate(&statuses);
    Evaluation {
        control_code: detail.overview.control_code.clone(),
        readiness: check_readiness(Some(detail), false),
        samples,
        summary,
        samples_tested: summary.progress(),
        failure_rate: summary.failure_rate(),
        rule,
        conclusion: summary.conclude(rule).ok(),
    }
}

/// Text rendering of an evaluation.
pub fn render_evaluation(evaluation: &Evaluation) -> String {
    let mut out = format!("{}\n", evaluation.control_code);
    if let Readiness::Blocked(reason) = evaluation.readiness {
        out.push_str(&format!("  warning: {reason}\n"));
    }
    for sample in &evaluation.samples {
        out.push_str(&format!(
            "  {:<12} system {:<14} final {}\n",
            sample.sample_id.as_str(),
            sample.system_result.label(),
            sample.status
        ));
    }
    let s = &evaluation.summary;
    out.push_str(&format!(
        "samples tested {}  passed {}  failed {}  n/a {}  failure rate {:.1}%\n",
        evaluation.samples_tested, s.passed, s.failed, s.not_applicable, evaluation.failure_rate
    ));
    match evaluation.conclusion {
        Some(conclusion) => out.push_str(&format!("conclusion ({}): {conclusion}\n", evaluation.rule)),
        None => out.push_str(&format!("conclusion: pending ({} not tested)\n", s.not_tested)),
    }
    out
}
