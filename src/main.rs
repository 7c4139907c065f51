//! Decorrelation explain CLI

use clap::{Parser, Subcommand};
use query_decorrelate::optimizer::{
    FilterSubqueryToApply, JoinSubqueryToApply, OneRowRelationSubqueryToApply, Optimizer,
    OptimizerRule, ProjectSubqueryToApply, StatementContext,
};
use query_decorrelate::scenarios::Scenario;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "query_decorrelate")]
#[command(about = "Subquery to Apply decorrelation explorer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a canned plan before and after decorrelation
    Explain {
        /// Scenario name (see `list`)
        scenario: Scenario,

        /// Bound on optimizer passes
        #[arg(short, long, default_value = "10")]
        max_iterations: usize,

        /// Run a single rule instead of all of them
        #[arg(short, long)]
        rule: Option<String>,
    },

    /// List scenarios and rules
    List,
}

fn all_rules() -> Vec<Arc<dyn OptimizerRule>> {
    vec![
        Arc::new(OneRowRelationSubqueryToApply),
        Arc::new(FilterSubqueryToApply),
        Arc::new(ProjectSubqueryToApply),
        Arc::new(JoinSubqueryToApply),
    ]
}

fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explain {
            scenario,
            max_iterations,
            rule,
        } => {
            let rules = match rule {
                Some(name) => {
                    let selected: Vec<_> =
                        all_rules().into_iter().filter(|r| r.name() == name).collect();
                    if selected.is_empty() {
                        eprintln!("Unknown rule '{}'. Run `list` for rule names.", name);
                        std::process::exit(1);
                    }
                    selected
                }
                None => all_rules(),
            };
            let optimizer = Optimizer::with_rules(rules).with_max_iterations(max_iterations);

            let mut ctx = StatementContext::new();
            let plan = match scenario.build(&mut ctx) {
                Ok(plan) => plan,
                Err(e) => {
                    eprintln!("Error building scenario: {}", e);
                    std::process::exit(1);
                }
            };

            println!("Scenario: {}", scenario);
            println!("\nOriginal plan:\n{}", plan);

            let start = Instant::now();
            match optimizer.optimize(plan, &mut ctx) {
                Ok(optimized) => {
                    println!("Decorrelated plan:\n{}", optimized);
                    println!(
                        "Converted {} subqueries in {:?}",
                        ctx.analyzed_count(),
                        start.elapsed()
                    );
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::List => {
            println!("Scenarios:");
            for scenario in Scenario::ALL {
                println!("  {}", scenario);
            }
            println!("\nRules:");
            for rule in Optimizer::new().rule_names() {
                println!("  {}", rule);
            }
        }
    }
}
