// SPDX-License-Identifier: AGPL-3.0-only

//! `mxu`: command-line interface for the 4×4 matrix-multiplication accelerator.
//!
//! ```text
//! USAGE:
//!   mxu run [--backend sim|mmio] [--a FILE] [--b FILE]   Multiply and print C
//!   mxu pack [--a FILE] [--b FILE]                        Show packed load words
//!   mxu regs                                              Print the register map
//! ```
//!
//! Without `--a`/`--b` the bring-up sample operands are used.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mxu_driver::chip::{Access, Register};
use mxu_driver::pack::{unpack_addresses, unpack_data};
use mxu_driver::{
    pack_column, pack_row, reference_product, samples, select_backend, timeout_from_ms,
    BackendSelection, Controller, DriverConfig, OperandMatrix,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mxu", about = "4x4 matrix-multiplier accelerator CLI", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load both operands, start the engine, wait, and print the product.
    Run {
        /// Register backend.
        #[arg(long, value_enum, default_value_t = Backend::Sim)]
        backend: Backend,
        /// Physical base address of the register window (overrides MXU_BASE_ADDR).
        #[arg(long, value_parser = parse_addr)]
        base: Option<u64>,
        /// Memory device file (overrides MXU_DEVICE_PATH).
        #[arg(long)]
        device: Option<PathBuf>,
        /// Done-bit timeout in milliseconds, 0 waits forever (overrides MXU_POLL_TIMEOUT_MS).
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Status polls before the simulated engine reports done.
        #[arg(long)]
        latency: Option<u32>,
        #[command(flatten)]
        operands: Operands,
        /// Compare the device result with the CPU reference product.
        #[arg(long)]
        verify: bool,
    },
    /// Print the address/data words written for each A column and B row.
    Pack {
        #[command(flatten)]
        operands: Operands,
    },
    /// Print the register map.
    Regs,
}

#[derive(clap::Args)]
struct Operands {
    /// Operand A file: 4 lines of 4 integers.
    #[arg(long = "a", value_name = "FILE")]
    a: Option<PathBuf>,
    /// Operand B file: 4 lines of 4 integers.
    #[arg(long = "b", value_name = "FILE")]
    b: Option<PathBuf>,
}

impl Operands {
    fn load(&self) -> Result<(OperandMatrix, OperandMatrix)> {
        let a = match &self.a {
            Some(path) => OperandMatrix::from_file(path)
                .with_context(|| format!("reading operand A from {}", path.display()))?,
            None => samples::matrix_a(),
        };
        let b = match &self.b {
            Some(path) => OperandMatrix::from_file(path)
                .with_context(|| format!("reading operand B from {}", path.display()))?,
            None => samples::matrix_b(),
        };
        Ok((a, b))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Software model of the accelerator.
    Sim,
    /// Memory-mapped hardware registers.
    Mmio,
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match cli.command {
        Cmd::Run {
            backend,
            base,
            device,
            timeout_ms,
            latency,
            operands,
            verify,
        } => {
            let mut config = DriverConfig::from_env().context("reading MXU_* environment")?;
            if let Some(base) = base {
                config.base_address = base;
            }
            if let Some(device) = device {
                config.device_path = device;
            }
            if let Some(ms) = timeout_ms {
                config.poll = config.poll.with_timeout(timeout_from_ms(ms));
            }
            if let Some(latency) = latency {
                config.completion_latency = latency;
            }
            cmd_run(backend, &config, &operands, verify)?;
        }
        Cmd::Pack { operands } => cmd_pack(&operands)?,
        Cmd::Regs => cmd_regs(),
    }

    Ok(())
}

fn cmd_run(backend: Backend, config: &DriverConfig, operands: &Operands, verify: bool) -> Result<()> {
    let (a, b) = operands.load()?;
    let selection = match backend {
        Backend::Sim => BackendSelection::Simulated,
        Backend::Mmio => BackendSelection::Mmio,
    };

    let regs = select_backend(selection, config).context("opening register backend")?;
    let backend_type = regs.backend_type();
    tracing::info!(
        backend = %backend_type,
        base = config.base_address,
        "register backend ready"
    );
    let mut ctl = Controller::new(regs, config);

    println!("Matrix multiplier ({backend_type} backend)");
    println!("A:\n{a}");
    println!("B:\n{b}");

    let report = ctl.run(&a, &b).context("accelerator run failed")?;

    println!("C:");
    print!("{}", report.result);
    println!();
    println!(
        "{} status polls, {:?} waiting, {} writes / {} reads, {:?} total",
        report.polls, report.wait, report.register_writes, report.register_reads, report.total
    );

    if verify {
        let expected = reference_product(&a, &b);
        if report.result == expected {
            println!("Verified against CPU reference: OK");
        } else {
            for (r, c, want) in expected.iter() {
                let got = report.result.get(r, c).unwrap_or_default();
                if got != want {
                    println!("C[{r}][{c}] mismatch: device {got}, reference {want}");
                }
            }
            anyhow::bail!("device result differs from CPU reference");
        }
    }

    Ok(())
}

fn cmd_pack(operands: &Operands) -> Result<()> {
    let (a, b) = operands.load()?;

    println!("Operand A (one write pair per column, bank = row):");
    for col in 0..4 {
        let packed = pack_column(&a, col)?;
        print_packed(&format!("col {col}"), packed.address, packed.data);
    }

    println!();
    println!("Operand B (one write pair per row, bank = column):");
    for row in 0..4 {
        let packed = pack_row(&b, row)?;
        print_packed(&format!("row {row}"), packed.address, packed.data);
    }

    Ok(())
}

fn print_packed(label: &str, address: u64, data: u64) {
    let addrs: Vec<String> = unpack_addresses(address)
        .iter()
        .map(|a| format!("b{}e{}", a.bank, a.element))
        .collect();
    let elems = unpack_data(data);
    println!(
        "  {label}: addr {address:#06x} [{}]  data {data:#018x} {elems:?}",
        addrs.join(" ")
    );
}

fn cmd_regs() {
    println!("{:<8} {:>6} {:>5} {:>4}", "NAME", "OFFSET", "WIDTH", "DIR");
    for reg in Register::ALL {
        let dir = match reg.access() {
            Access::Read => "R",
            Access::Write => "W",
        };
        println!(
            "{:<8} {:>#6x} {:>5} {:>4}",
            reg.name(),
            reg.offset(),
            reg.width().bits(),
            dir
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_addr_accepts_hex_and_decimal() {
        assert_eq!(parse_addr("0xFF20_0000"), Ok(0xFF20_0000));
        assert_eq!(parse_addr("4096"), Ok(4096));
        assert!(parse_addr("0xnope").is_err());
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "mxu", "-vv", "run", "--backend", "mmio", "--base", "0x10000", "--timeout-ms", "0",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Cmd::Run {
                backend: Backend::Mmio,
                base: Some(0x10000),
                timeout_ms: Some(0),
                ..
            } => {}
            _ => panic!("unexpected parse"),
        }
    }
}
