use clap::{Parser, Subcommand};
use hapi::builder::{build_buffer, BuildOptions, Node};
use hapi::codec::DEFAULT_COMPRESSION_LEVEL;
use hapi::{HapiContext, ItemFilter, ItemId};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hapi", about = "HAPI archive (.hpi/.ufo/.ccx) CLI")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files and directories into a new archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// zlib level 0-9
        #[arg(short, long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        level: u32,
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
    },
    /// Extract entries, optionally only those matching a name or path glob
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        pattern: Option<String>,
    },
    /// List archive contents
    List {
        input: PathBuf,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, level, inputs } => {
            let mut seen = HashSet::new();
            let mut forest = Vec::with_capacity(inputs.len());
            for path in &inputs {
                if !seen.insert(path.canonicalize()?) {
                    warn!(path = %path.display(), "duplicate input skipped");
                    continue;
                }
                forest.push(node_for(path)?);
            }
            let bytes = build_buffer(forest, &BuildOptions { compression_level: level })?;
            std::fs::write(&output, &bytes)?;
            info!(archive = %output.display(), size = bytes.len(), "archive created");
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, pattern } => {
            let ctx = HapiContext::open(&input)?;
            let roots = match pattern.as_deref() {
                None => vec![ctx.root()],
                Some(p) if p.contains('/') => ctx.find_children_at(p, None, ItemFilter::Any),
                Some(p) => ctx.find_children(p, None, ItemFilter::Any, true),
            };

            let mut done = HashSet::new();
            for root in roots {
                for id in ctx.tree().walk_from(root) {
                    if ctx.item(id).is_directory() || !done.insert(id) {
                        continue;
                    }
                    extract_entry(&ctx, id, &output_dir)?;
                }
            }
            info!(files = done.len(), dest = %output_dir.display(), "extraction finished");
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let ctx = HapiContext::open(&input)?;
            println!("Archive: {}", input.display());
            println!("{:<40} {:>12} {:>12}  Checksum", "Path", "Size", "Stored");
            for id in ctx.tree().entries() {
                let item = ctx.item(id);
                let Some(record) = item.entry_record() else { continue };
                let stored = if record.is_compressed() {
                    record.compressed_size.to_string()
                } else {
                    "raw".to_owned()
                };
                println!("{:<40} {:>12} {:>12}  {}",
                    item.path(), record.flat_size, stored, hex::encode(record.checksum.to_le_bytes()));
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let ctx = HapiContext::open(&input)?;
            let header = ctx.header();
            let (dirs, files): (Vec<ItemId>, Vec<ItemId>) =
                ctx.tree().walk().partition(|id| ctx.item(*id).is_directory());
            let flat: u64 = files.iter().filter_map(|id| ctx.item(*id).size()).map(u64::from).sum();

            println!("── HAPI Archive ─────────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Size            {} B", ctx.file().len());
            println!("  Version         {:#010x}", ctx.version().version);
            println!("  Data offset     {}", header.data_ptr);
            println!("  Names region    {} B at {} ({} B inflated)",
                header.names_block_len, header.names_block_ptr, ctx.names_buffer().len());
            println!("  Directory region {} B at {} ({} B inflated)",
                header.dir_block_len, header.dir_block_ptr, ctx.directory_buffer().len());
            println!("  Directories     {}", dirs.len() - 1);
            println!("  Files           {}", files.len());
            println!("  Flat size       {} B", flat);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

/// Turn a path on disk into a builder node, streaming file contents.
fn node_for(path: &Path) -> io::Result<Node> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no file name in {}", path.display())))?;
    let meta = std::fs::metadata(path)?;
    if !meta.is_dir() {
        debug!(path = %path.display(), size = meta.len(), "file");
        return Ok(Node::reader(name, meta.len() as usize, File::open(path)?));
    }

    let mut entries = std::fs::read_dir(path)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    let children = entries.iter().map(|p| node_for(p)).collect::<io::Result<Vec<_>>>()?;
    Ok(Node::directory(name, children))
}

/// Stream one entry to `dest`, refusing paths that would escape it.
fn extract_entry(ctx: &HapiContext, id: ItemId, dest: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let item = ctx.item(id);
    let relative = Path::new(item.path().trim_start_matches('/'));
    let safe = relative.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe || relative.as_os_str().is_empty() {
        warn!(path = item.path(), "unsafe path skipped");
        return Ok(());
    }
    let target = dest.join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(&target)?);
    for chunk in ctx.item_reader(id)? {
        out.write_all(&chunk?)?;
    }
    out.flush()?;
    debug!(path = item.path(), "extracted");
    Ok(())
}
