use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::ops::Range;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::{json, Value};
use stowage_sdk::metadata::CONTENT_TYPE;
use stowage_sdk::{
    is_cursor_end, walk_containers, walk_items, ConfigMap, Container, Item, Location, Metadata,
    RangeReader,
};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    stowage_sdk::register_builtin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Kinds => cmd_kinds(&mut out, cli.format),
        command => {
            let location = open_location(&cli.location)?;
            let result = run_on(location.as_ref(), command, cli.format, &mut out);
            location.close()?;
            result
        }
    }
}

fn run_on(
    location: &dyn Location,
    command: Command,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::Kinds => cmd_kinds(out, format),
        Command::Containers(args) => cmd_containers(location, args, format, out),
        Command::CreateContainer(args) => {
            let container = location.create_container(&args.name)?;
            report(out, format, "created container", container.name())
        }
        Command::RemoveContainer(args) => {
            location.remove_container(&args.name)?;
            report(out, format, "removed container", &args.name)
        }
        Command::Ls(args) => cmd_ls(location, args, format, out),
        Command::Put(args) => cmd_put(location, args, format, out),
        Command::Get(args) => cmd_get(location, args, out),
        Command::Stat(args) => cmd_stat(location, args, format, out),
        Command::Rm(args) => {
            location.container(&args.container)?.remove_item(&args.name)?;
            report(out, format, "removed", &args.name)
        }
    }
}

/// Merge the config file with `-c` pairs; later values win.
pub fn load_config(args: &LocationArgs) -> anyhow::Result<ConfigMap> {
    let mut config = ConfigMap::new();
    if let Some(path) = &args.config_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let table: toml::Table = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            config.set(key, value);
        }
    }
    for pair in &args.config {
        let (key, value) = ConfigMap::parse_pair(pair)?;
        config.set(key, value);
    }
    Ok(config)
}

fn open_location(args: &LocationArgs) -> anyhow::Result<Box<dyn Location>> {
    let config = load_config(args)?;
    debug!(kind = %args.kind, keys = config.len(), "connecting");
    stowage_sdk::connect(&args.kind, &config)
        .with_context(|| format!("connecting to {}", args.kind))
}

fn cmd_kinds(out: &mut dyn Write, format: OutputFormat) -> anyhow::Result<()> {
    let kinds = stowage_sdk::kinds();
    match format {
        OutputFormat::Json => writeln!(out, "{}", json!(kinds))?,
        OutputFormat::Text => {
            for kind in kinds {
                writeln!(out, "{}", kind.cyan())?;
            }
        }
    }
    Ok(())
}

fn cmd_containers(
    location: &dyn Location,
    args: ListArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let summary = |c: &dyn Container| json!({ "id": c.id(), "name": c.name() });
    let (rows, cursor) = if args.all {
        let mut rows = Vec::new();
        walk_containers(location, &args.prefix, args.count, |c| {
            rows.push(summary(c));
            Ok(())
        })?;
        (rows, String::new())
    } else {
        let page = location.containers(&args.prefix, &args.cursor, args.count)?;
        let rows = page.items.iter().map(|c| summary(c.as_ref())).collect();
        (rows, page.cursor)
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", json!({ "containers": rows, "cursor": cursor }))?,
        OutputFormat::Text => {
            for row in &rows {
                writeln!(out, "{}", row["name"].as_str().unwrap_or_default().bold())?;
            }
            next_cursor(out, &cursor)?;
        }
    }
    Ok(())
}

fn cmd_ls(
    location: &dyn Location,
    args: LsArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let container = location.container(&args.container)?;
    let list = args.list;
    let (rows, cursor) = if list.all {
        let mut rows = Vec::new();
        walk_items(container.as_ref(), &list.prefix, list.count, |item| {
            rows.push(item_summary(item)?);
            Ok(())
        })?;
        (rows, String::new())
    } else {
        let page = container.items(&list.prefix, &list.cursor, list.count)?;
        let mut rows = Vec::with_capacity(page.len());
        for item in &page.items {
            rows.push(item_summary(item.as_ref())?);
        }
        (rows, page.cursor)
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", json!({ "items": rows, "cursor": cursor }))?,
        OutputFormat::Text => {
            for row in &rows {
                writeln!(
                    out,
                    "{:>12}  {}  {}",
                    row["size"],
                    row["last_modified"].as_str().unwrap_or_default().dimmed(),
                    row["name"].as_str().unwrap_or_default()
                )?;
            }
            next_cursor(out, &cursor)?;
        }
    }
    Ok(())
}

fn cmd_put(
    location: &dyn Location,
    args: PutArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut metadata = Metadata::new();
    for pair in &args.meta {
        let (key, value) = ConfigMap::parse_pair(pair)?;
        metadata.insert(key, Value::String(value));
    }
    if let Some(content_type) = args.content_type {
        metadata.insert(CONTENT_TYPE.to_string(), Value::String(content_type));
    }

    let container = location.container(&args.container)?;
    let item = match &args.file {
        Some(path) => {
            let mut file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let size = file.metadata()?.len();
            container.put(&args.name, &mut file, size, &metadata)?
        }
        None => {
            let mut body = Vec::new();
            io::stdin().lock().read_to_end(&mut body).context("reading stdin")?;
            let size = body.len() as u64;
            container.put(&args.name, &mut body.as_slice(), size, &metadata)?
        }
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", item_summary(item.as_ref())?)?,
        OutputFormat::Text => writeln!(
            out,
            "{} Stored {} ({} bytes)",
            "✓".green().bold(),
            item.url().as_str().yellow(),
            item.size()?
        )?,
    }
    Ok(())
}

fn cmd_get(location: &dyn Location, args: GetArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let item = location.container(&args.container)?.item(&args.name)?;
    let mut reader: RangeReader = match &args.range {
        Some(range) => stowage_sdk::open_range(item.as_ref(), parse_range(range)?)?,
        None => Box::new(item.open()?),
    };
    let copied = match &args.output {
        Some(path) => {
            let mut file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            io::copy(&mut reader, &mut file)?
        }
        None => io::copy(&mut reader, out)?,
    };
    debug!(item = %args.name, bytes = copied, "copied item content");
    Ok(())
}

fn cmd_stat(
    location: &dyn Location,
    args: ItemArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let item = location.container(&args.container)?.item(&args.name)?;
    let mut summary = item_summary(item.as_ref())?;
    summary["url"] = json!(item.url().as_str());
    summary["etag"] = json!(item.etag()?);
    let metadata = item.metadata()?;

    match format {
        OutputFormat::Json => {
            summary["metadata"] = json!(metadata);
            writeln!(out, "{summary}")?;
        }
        OutputFormat::Text => {
            writeln!(out, "{}", item.name().bold())?;
            for key in ["url", "size", "etag", "last_modified"] {
                writeln!(out, "  {:<14} {}", format!("{key}:"), plain(&summary[key]))?;
            }
            if !metadata.is_empty() {
                writeln!(out, "  metadata:")?;
                for (key, value) in &metadata {
                    writeln!(out, "    {} = {}", key.cyan(), plain(value))?;
                }
            }
        }
    }
    Ok(())
}

fn item_summary(item: &dyn Item) -> stowage_sdk::Result<Value> {
    Ok(json!({
        "name": item.name(),
        "size": item.size()?,
        "last_modified": item.last_mod()?.to_rfc3339(),
    }))
}

fn report(out: &mut dyn Write, format: OutputFormat, what: &str, name: &str) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", json!({ "ok": true, "action": what, "name": name }))?,
        OutputFormat::Text => writeln!(out, "{} {} {}", "✓".green().bold(), what, name.yellow())?,
    }
    Ok(())
}

fn next_cursor(out: &mut dyn Write, cursor: &str) -> io::Result<()> {
    if is_cursor_end(cursor) {
        return Ok(());
    }
    writeln!(out, "{} {}", "next cursor:".dimmed(), cursor)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse `START..END`.
pub fn parse_range(text: &str) -> anyhow::Result<Range<u64>> {
    let Some((start, end)) = text.split_once("..") else {
        bail!("expected START..END, got {text:?}");
    };
    let start: u64 = start.trim().parse().with_context(|| format!("range start in {text:?}"))?;
    let end: u64 = end.trim().parse().with_context(|| format!("range end in {text:?}"))?;
    Ok(start..end)
}
