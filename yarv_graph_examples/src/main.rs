// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Prints the disassembly, CFG, DFG and sea-of-nodes graph of the sample programs.
//!
//! ```text
//! cargo run -p yarv_graph_examples -- ternary_plus --stage mermaid
//! RUST_LOG=yarv_graph=trace cargo run -p yarv_graph_examples -- while_sum --run
//! ```

use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yarv_graph::cfg::Cfg;
use yarv_graph::dfg::Dfg;
use yarv_graph::soy::Soy;
use yarv_tape::iseq::InstructionSequence;
use yarv_tape::vm::{Limits, Vm};
use yarv_tape_conformance::{StdHost, programs};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Stage {
    Disasm,
    Cfg,
    Dfg,
    Mermaid,
    All,
}

#[derive(Parser, Debug)]
#[command(name = "yarv-graph")]
#[command(about = "Show the graphs built for the sample programs")]
struct Cli {
    /// Sample names; every sample when empty
    samples: Vec<String>,

    /// Which output to print
    #[arg(long, value_enum, default_value = "all")]
    stage: Stage,

    /// Also run each sample against the reference host
    #[arg(long)]
    run: bool,

    /// List sample names and exit
    #[arg(long)]
    list: bool,
}

/// Prints the requested stages for `top` and every method and block body nested in it.
fn show(
    name: &str,
    top: &InstructionSequence,
    stage: Stage,
) -> Result<(), yarv_graph::GraphError> {
    let wants = |s: Stage| stage == Stage::All || stage == s;
    for iseq in top.all_iseqs() {
        if wants(Stage::Disasm) {
            println!("{}", iseq.disasm());
        }
        let cfg = Cfg::build(iseq)?;
        info!(sample = name, iseq = iseq.name(), blocks = cfg.blocks().len(), "cfg built");
        if wants(Stage::Cfg) {
            println!("{}", cfg.disasm());
        }
        let dfg = Dfg::build(cfg)?;
        if wants(Stage::Dfg) {
            println!("{}", dfg.disasm());
        }
        let soy = Soy::build(dfg)?;
        info!(sample = name, iseq = iseq.name(), phis = soy.phi_count(), "soy built");
        if wants(Stage::Mermaid) {
            println!("{}", soy.mermaid());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yarv_graph_examples=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let samples = match programs::samples() {
        Ok(samples) => samples,
        Err(e) => {
            error!("failed to assemble samples: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cli.list {
        for (name, _) in &samples {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }
    if let Some(unknown) = cli
        .samples
        .iter()
        .find(|wanted| !samples.iter().any(|(name, _)| name == wanted))
    {
        error!("unknown sample `{unknown}`; try --list");
        return ExitCode::FAILURE;
    }

    let mut status = ExitCode::SUCCESS;
    for (name, iseq) in samples {
        if !cli.samples.is_empty() && !cli.samples.iter().any(|s| s == name) {
            continue;
        }
        println!("# {name}\n");
        if let Err(e) = show(name, &iseq, cli.stage) {
            error!(sample = name, "{e}");
            status = ExitCode::FAILURE;
            continue;
        }
        if cli.run {
            let mut vm = Vm::new(StdHost::new(), Limits::default());
            match vm.run(&Rc::new(iseq)) {
                Ok(v) => println!("=> {}\n", v.inspect()),
                Err(fault) => {
                    error!(sample = name, "{fault}");
                    status = ExitCode::FAILURE;
                }
            }
        }
    }
    status
}
