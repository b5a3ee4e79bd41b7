//! Drive a scripted multisig session against an in-memory ledger.
//!
//! A set of signers each open their own [Store] on the same contract. The first signer proposes
//! adding a signer, raising the threshold, and a token transfer. Signers sign each proposal until
//! it reaches the threshold, then the first signer executes it. Time is simulated, so retries and
//! write deadlines resolve instantly.

use clap::{value_parser, Arg, Command};
use commonware_runtime::{deterministic, Metrics as _, Runner};
use multisig_engine::{
    cache::{Backend, Durable, Memory, SignatureCache},
    gateway::{self, Gateway},
    mocks::{self, Ledger},
    repository::Repository,
    store::Store,
    Config, Error,
};
use multisig_model::{format, validation, Operation, Proposal};
use std::{path::PathBuf, str::FromStr};
use tracing::{error, info, Level};

/// Seed of the address of the simulated contract.
const CONTRACT: u8 = 0xAA;

type Session<B> = Store<
    deterministic::Context,
    Ledger<deterministic::Context>,
    Ledger<deterministic::Context>,
    B,
>;

struct Args {
    config: Option<Config>,
    signers: u8,
    threshold: u32,
    transient_rate: f64,
    seed: u64,
}

fn describe(proposal: &Proposal) -> String {
    let detail = match &proposal.operation {
        Operation::AddSigner { signer } | Operation::RemoveSigner { signer } => {
            format::short_address(&signer.to_string(), 6, 4)
        }
        Operation::ChangeThreshold { threshold } => threshold.to_string(),
        Operation::ExecuteTransaction {
            recipient, amount, ..
        } => format!(
            "{} to {}",
            format::format_amount(*amount, 18),
            format::short_address(&recipient.to_string(), 6, 4)
        ),
    };
    format!("{} ({detail})", proposal.operation_type().label())
}

async fn run<B: Backend>(
    context: deterministic::Context,
    args: &Args,
    cfg: gateway::Config,
    backends: Vec<B>,
) -> Result<(), Error> {
    let signers: Vec<_> = (1..=args.signers).map(mocks::address).collect();
    let ledger = Ledger::new(
        context.clone(),
        cfg.contract,
        signers.iter().copied(),
        args.threshold,
    );
    ledger.set_transient_rate(args.transient_rate, args.seed);

    let mut sessions: Vec<Session<B>> = signers
        .iter()
        .zip(backends)
        .map(|(signer, backend)| {
            let index = signer.as_bytes()[0];
            let gateway = Gateway::new(
                context.with_label(&format!("signer_{index}")),
                ledger.clone(),
                ledger.connect(*signer),
                cfg.clone(),
            );
            Store::new(Repository::new(gateway, SignatureCache::new(backend)))
        })
        .collect();

    let newcomer = mocks::address(args.signers.saturating_add(1));
    let threshold = args.threshold.saturating_add(1).min(u32::from(args.signers));
    let operations = [
        validation::add_signer(&newcomer.to_string())?,
        validation::change_threshold(&threshold.to_string())?,
        validation::execute_transaction(
            "0x6b175474e89094c44da98b954eedeac495271d0f",
            "0x000000000000000000000000000000000000dead",
            "1500000000000000000",
        )?,
    ];

    let Some(proposer) = sessions.first_mut() else {
        return Err(Error::Config("at least one signer is required".into()));
    };
    let mut ids = Vec::new();
    for operation in operations {
        match proposer.create_proposal(operation).await {
            Ok(outcome) => {
                info!(assignment = ?outcome.value, refreshed = outcome.refresh.is_ok(), "created");
                ids.push(outcome.value.id());
            }
            Err(err) => error!(?err, "failed to create proposal"),
        }
    }

    for id in &ids {
        for session in sessions.iter_mut() {
            if let Err(err) = session.sign_proposal(*id).await {
                error!(%id, ?err, "failed to sign");
            }
            if session.by_id(*id).is_some_and(|p| p.can_execute()) {
                break;
            }
        }
        let Some(executor) = sessions.first_mut() else {
            break;
        };
        if let Err(err) = executor.execute_proposal(*id).await {
            error!(%id, ?err, "failed to execute");
        }
    }

    let Some(observer) = sessions.first_mut() else {
        return Ok(());
    };
    let stats = observer.load_stats().await?;
    for proposal in &observer.snapshot().proposals {
        info!(
            id = %proposal.id,
            status = %proposal.status(),
            signatures = proposal.signature_count,
            "{}",
            describe(proposal)
        );
    }
    let settings = observer.load_settings().await?;
    info!(
        threshold = stats.threshold,
        signers = stats.total_signers,
        pending = stats.pending_proposals,
        executed = stats.executed_proposals,
        total = stats.total_proposals,
        is_signer = settings.is_signer,
        "final state"
    );
    Ok(())
}

fn main() {
    let matches = Command::new("simulate")
        .about("Run a scripted multisig session against an in-memory ledger")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("JSON client configuration"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .help("Seed for the runtime and injected failures"),
        )
        .arg(
            Arg::new("signers")
                .long("signers")
                .value_parser(value_parser!(u8).range(1..20))
                .default_value("3")
                .help("Number of initial signers"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .value_parser(value_parser!(u32))
                .default_value("2")
                .help("Initial signature threshold"),
        )
        .arg(
            Arg::new("transient-rate")
                .long("transient-rate")
                .value_parser(value_parser!(f64))
                .default_value("0.1")
                .help("Probability that a read fails with a storage race"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("info")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .and_then(|level| Level::from_str(level).ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match matches.get_one::<PathBuf>("config").map(Config::from_file) {
        Some(Ok(config)) => Some(config),
        Some(Err(err)) => {
            error!(?err, "invalid configuration");
            std::process::exit(1);
        }
        None => None,
    };
    let args = Args {
        config,
        signers: matches.get_one::<u8>("signers").copied().unwrap_or(3),
        threshold: matches.get_one::<u32>("threshold").copied().unwrap_or(2),
        transient_rate: matches.get_one::<f64>("transient-rate").copied().unwrap_or(0.0),
        seed: matches.get_one::<u64>("seed").copied().unwrap_or(0),
    };
    if args.threshold == 0 || args.threshold > u32::from(args.signers) {
        error!(threshold = args.threshold, signers = args.signers, "invalid threshold");
        std::process::exit(1);
    }

    let executor = deterministic::Runner::seeded(args.seed);
    let result = executor.start(|context| async move {
        let context = context.with_label("simulate");
        let gateway = match &args.config {
            Some(config) => config.gateway()?,
            None => gateway::Config::new(mocks::address(CONTRACT)),
        };
        let partition = args.config.as_ref().and_then(|c| c.cache_partition.clone());
        match partition {
            Some(partition) => {
                // One partition per signer, as each device keeps its own hints
                let mut backends = Vec::new();
                for index in 1..=args.signers {
                    let partition = format!("{partition}_{index}");
                    backends.push(Durable::init(&context, &partition).await?);
                }
                run(context, &args, gateway, backends).await
            }
            None => {
                let backends = (1..=args.signers).map(|_| Memory::default()).collect();
                run(context, &args, gateway, backends).await
            }
        }
    });
    if let Err(err) = result {
        error!(?err, "simulation failed");
        std::process::exit(1);
    }
}
