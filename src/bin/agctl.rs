//! Binary entry point for the attrgraph demo/inspection CLI.

use clap::{Parser, Subcommand};

use attrgraph::{
    AttributeId, AttributeTypeBuilder, ComparisonMode, Graph, GraphConfig, GraphCounter,
    InputOptions, PropagationFlags, Subgraph, TraversalOptions, TypeMetadata, UpdateStatus,
};

#[derive(Parser, Debug)]
#[command(name = "agctl", version, about = "Inspect and exercise an attrgraph engine")]
struct Cli {
    #[arg(long, global = true, default_value = "attrgraph=info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a small diamond-shaped dependency graph, update it, and print
    /// the resulting counters.
    Demo {
        #[arg(long, default_value_t = 10)]
        value: i32,
    },
    /// Print the environment-derived graph configuration and exit.
    ShowConfig,
}

fn main() {
    let cli = Cli::parse();
    let _ = attrgraph::logging::init_logging(&cli.log);

    match cli.command {
        Command::Demo { value } => run_demo(value),
        Command::ShowConfig => show_config(),
    }
}

fn show_config() {
    let config = GraphConfig::from_env();
    println!("{config:#?}");
}

/// A diamond: `root` feeds both `left` and `right`, which both feed `sum`.
/// Updating `root` and reading `sum` recomputes every node exactly once.
fn run_demo(value: i32) {
    let graph = Graph::new();
    let ctx = graph.new_context();

    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);

        let source_type = graph.intern_type(TypeMetadata("agctl::source"), || {
            AttributeTypeBuilder::new("source", |_ctx, _id| {})
                .comparison_mode(ComparisonMode::Structural)
                .build()
        });
        let double_type = graph.intern_type(TypeMetadata("agctl::double"), || {
            AttributeTypeBuilder::new("double", |ctx, _id| {
                let Some(root) = ctx.body_mut::<AttributeId>().copied() else {
                    return;
                };
                if let Ok(n) = ctx.input::<i32>(root, InputOptions::NONE) {
                    ctx.set_value(n * 2);
                }
            })
            .build()
        });
        let sum_type = graph.intern_type(TypeMetadata("agctl::sum"), || {
            AttributeTypeBuilder::new("sum", |ctx, _id| {
                let Some((left, right)) = ctx.body_mut::<(AttributeId, AttributeId)>().copied() else {
                    return;
                };
                let l = ctx.input::<i32>(left, InputOptions::NONE).unwrap_or(0);
                let r = ctx.input::<i32>(right, InputOptions::NONE).unwrap_or(0);
                ctx.set_value(l + r);
            })
            .build()
        });

        let root = subgraph.create_attribute(source_type, ());
        attrgraph::set_value(root, value).expect("root is a source attribute");

        let left = subgraph.create_attribute(double_type, root);
        let right = subgraph.create_attribute(double_type, root);
        let sum = subgraph.create_attribute(sum_type, (left, right));

        let status = subgraph.update(PropagationFlags::ALL);
        let read = attrgraph::get_value::<i32>(sum, TraversalOptions::UPDATE_DEPENDENCIES)
            .expect("sum has a value after update");

        println!("update status: {status:?}");
        println!("sum = {}", read.value);
        println!("node count: {}", graph.counter(GraphCounter::NodeCount));
        assert_eq!(status, UpdateStatus::Changed);
    });
}
