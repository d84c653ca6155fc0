use std::env;
use std::io::{self, Read};
use std::process;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use mapview::{
    xml, CompileOptions, Containers, DynamicKeys, Engine, ExtractOptions, Mapping, RenderArgs,
    ViewConfig,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CliInput {
    command: Command,
    #[serde(default)]
    html: String,
    #[serde(default)]
    mapping: Value,
    #[serde(default)]
    model: Value,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    partials: Vec<String>,
    #[serde(default)]
    containers: Containers,
    #[serde(default)]
    widget_id: String,
    #[serde(default)]
    dynamic_keys: DynamicKeys,
    #[serde(default)]
    template_id: Option<String>,
    #[serde(default)]
    normalize_whitespace: bool,
    #[serde(default)]
    id_attribute: Option<String>,
    #[serde(default)]
    root_name: Option<String>,
    #[serde(default)]
    config: ViewConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Command {
    Render,
    Extract,
    Slice,
    Xml,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("[mapview] {:#}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let pretty = parse_pretty()?;

    let mut stdin_payload = String::new();
    io::stdin()
        .read_to_string(&mut stdin_payload)
        .context("failed to read stdin")?;

    if stdin_payload.trim().is_empty() {
        bail!("stdin payload is empty");
    }

    let input: CliInput = serde_json::from_str(&stdin_payload).context("invalid input JSON")?;
    let output = execute(input)?;

    let text = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);
    Ok(())
}

fn execute(input: CliInput) -> Result<Value> {
    let engine = Engine::new(input.config.clone());
    let mapping = if input.mapping.is_null() {
        Mapping::default()
    } else {
        Mapping::from_value(&input.mapping).context("invalid mapping")?
    };

    let output = match input.command {
        Command::Render => {
            let options = CompileOptions {
                normalize_whitespace: input.normalize_whitespace,
                template_id: input.template_id.clone(),
            };
            let view = engine
                .compile(&input.html, &mapping, &options)
                .context("compilation failed")?;
            let html = view.render(
                &input.model,
                &RenderArgs {
                    mode: &input.mode,
                    body: &input.body,
                    partials: &input.partials,
                    containers: Some(&input.containers),
                    widget_id: &input.widget_id,
                    dynamic_keys: Some(&input.dynamic_keys),
                },
            );
            json!({
                "html": html,
                "isLayout": view.is_layout(),
                "layout": view.layout(),
                "partials": view.partials(),
                "containers": view.containers(),
            })
        }
        Command::Extract => {
            let options = ExtractOptions {
                dynamic_keys: input.dynamic_keys,
                normalize_whitespace: input.normalize_whitespace,
                seed: None,
            };
            engine
                .extract(&input.html, &mapping, &options)
                .context("extraction failed")?
        }
        Command::Slice => {
            let fragments = engine.slice(&input.html, input.id_attribute.as_deref());
            serde_json::to_value(fragments)?
        }
        Command::Xml => {
            let xml = xml::to_xml(&input.model, input.root_name.as_deref())
                .context("XML serialization failed")?;
            json!({ "xml": xml })
        }
    };
    Ok(output)
}

fn parse_pretty() -> Result<bool> {
    let mut pretty = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--pretty" => pretty = true,
            _ => bail!("unknown argument '{arg}'. usage: mapview [--pretty] < request.json"),
        }
    }
    Ok(pretty)
}
