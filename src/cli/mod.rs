//! TP-030: CLI subcommands: generate, graph, validate.

use crate::core::parser;
use crate::gen::nodejs::{NodeJsGenerator, NodeJsOptions};
use crate::gen::generate;
use crate::il::graph::{build_module_graphs, BuildOptions, Graph};
use crate::il::scheduler;
use crate::il::schema::StaticProviderInfo;
use clap::{Args, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a module tree to a TypeScript program
    Generate {
        #[command(flatten)]
        input: InputArgs,

        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// @pulumi/pulumi version the program targets
        #[arg(long, default_value = "1.0.0")]
        target_version: String,

        /// Hoist data-source lookups ahead of resources
        #[arg(long)]
        prompt_data_sources: bool,

        /// Project name recorded in logs
        #[arg(long, default_value = "main")]
        project_name: String,
    },

    /// Print each module's nodes in emission order with their dependencies
    Graph {
        #[command(flatten)]
        input: InputArgs,

        /// Use the hoisted data-source order
        #[arg(long)]
        prompt_data_sources: bool,
    },

    /// Build every module graph without emitting code
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },
}

/// Where the module tree and provider info come from, and what to tolerate.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Root module directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Directory of <provider>.yaml / <provider>.json schema files
    #[arg(long)]
    pub providers: Option<PathBuf>,

    /// Substitute opaque schemas for unknown resource types
    #[arg(long)]
    pub allow_missing_providers: bool,

    /// Create placeholders for undeclared variables
    #[arg(long)]
    pub allow_missing_variables: bool,

    /// Accept modules whose comments could not be located
    #[arg(long)]
    pub allow_missing_comments: bool,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Generate {
            input,
            output,
            target_version,
            prompt_data_sources,
            project_name,
        } => {
            let options = NodeJsOptions {
                project_name,
                target_version,
                prompt_data_sources,
                ..Default::default()
            };
            cmd_generate(&input, &options, output.as_deref())
        }
        Commands::Graph {
            input,
            prompt_data_sources,
        } => cmd_graph(&input, prompt_data_sources),
        Commands::Validate { input } => cmd_validate(&input),
    }
}

/// Load the tree and provider info, then build every module graph.
fn load_graphs(input: &InputArgs) -> Result<Vec<Graph>, String> {
    let tree = parser::load_tree(&input.dir, "main")?;
    let info = match &input.providers {
        Some(dir) => StaticProviderInfo::load_dir(dir)?,
        None => StaticProviderInfo::new(),
    };
    let options = BuildOptions {
        provider_info: Some(&info),
        allow_missing_providers: input.allow_missing_providers,
        allow_missing_variables: input.allow_missing_variables,
        allow_missing_comments: input.allow_missing_comments,
    };
    build_module_graphs(&tree, &options).map_err(|e| e.to_string())
}

fn cmd_generate(input: &InputArgs, options: &NodeJsOptions, output: Option<&Path>) -> Result<(), String> {
    let graphs = load_graphs(input)?;
    let mut gen = NodeJsGenerator::new(options.clone(), Vec::new()).map_err(|e| e.to_string())?;
    generate(&graphs, &mut gen).map_err(|e| e.to_string())?;
    let program = gen.into_inner();

    match output {
        Some(path) => {
            std::fs::write(path, &program)
                .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
            eprintln!("  Wrote: {}", path.display());
        }
        None => std::io::stdout()
            .write_all(&program)
            .map_err(|e| format!("failed to write stdout: {}", e))?,
    }
    Ok(())
}

fn cmd_graph(input: &InputArgs, prompt: bool) -> Result<(), String> {
    let graphs = load_graphs(input)?;
    print!("{}", render_graphs(&graphs, prompt)?);
    Ok(())
}

/// One block per module: `address <- dep, dep` in emission order.
fn render_graphs(graphs: &[Graph], prompt: bool) -> Result<String, String> {
    let mut out = String::new();
    for graph in graphs {
        let order = scheduler::order(graph, prompt).map_err(|e| e.to_string())?;
        out.push_str(&format!("{} ({}):\n", graph.name, graph.path));
        for id in order {
            let node = graph.node(id);
            let deps: Vec<String> = node
                .dependencies()
                .iter()
                .map(|d| graph.node(*d).address())
                .collect();
            if deps.is_empty() {
                out.push_str(&format!("  {}\n", node.address()));
            } else {
                out.push_str(&format!("  {} <- {}\n", node.address(), deps.join(", ")));
            }
        }
    }
    Ok(out)
}

fn cmd_validate(input: &InputArgs) -> Result<(), String> {
    let graphs = load_graphs(input)?;
    let nodes: usize = graphs.iter().map(|g| g.nodes.len()).sum();
    println!(
        "OK: {} ({} modules, {} nodes)",
        input.dir.display(),
        graphs.len(),
        nodes
    );
    Ok(())
}
