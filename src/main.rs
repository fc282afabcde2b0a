use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use filter_normalizer::config::MetadataConfig;
use filter_normalizer::pipeline::{FilterPipeline, PipelineOutput};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Odata,
    Sql,
    Json,
    All,
}

/// 过滤条件规范化：DSL 或 JSON 条件 → 规范化条件树 → $filter / SQL
#[derive(Debug, ClapParser)]
#[command(name = "filter_normalizer", version)]
struct Cli {
    /// 实体元数据 JSON 配置文件；省略时使用内置实体
    #[arg(long)]
    config: Option<PathBuf>,

    /// 查询的实体
    #[arg(long, default_value = "Customers")]
    entity: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::All)]
    format: OutputFormat,

    /// 过滤表达式，例如 `Filter: name["Acme"]; Search: "berlin"`；省略时进入交互模式
    expression: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pipeline = FilterPipeline::new(load_metadata(cli.config.as_deref())?);

    match &cli.expression {
        Some(expression) => {
            let output = pipeline
                .run(expression, &cli.entity)
                .context("无法构建过滤条件")?;
            print_output(&output, cli.format)
        }
        None => repl(&pipeline, cli.entity, cli.format),
    }
}

/// 加载元数据配置，未指定文件时使用内置配置
fn load_metadata(path: Option<&Path>) -> Result<MetadataConfig> {
    match path {
        Some(path) => MetadataConfig::from_json_file(path)
            .with_context(|| format!("无法加载元数据配置 {}", path.display())),
        None => {
            tracing::info!("using built-in entity metadata");
            Ok(MetadataConfig::default())
        }
    }
}

/// 交互模式：每行一个过滤表达式，`:entity <名称>` 切换实体，`exit` 退出
fn repl(pipeline: &FilterPipeline, mut entity: String, format: OutputFormat) -> Result<()> {
    println!("--- Filter Normalizer ---");
    println!("实体: {}", pipeline.metadata().entities.keys().cloned().collect::<Vec<_>>().join(", "));

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline(&format!("{}> ", entity)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        editor.add_history_entry(input)?;

        if input == "exit" || input == "quit" {
            break;
        }
        if let Some(name) = input.strip_prefix(":entity") {
            entity = name.trim().to_string();
            println!("✓ 当前实体: {}", entity);
            continue;
        }

        match pipeline.run(input, &entity) {
            Ok(output) => print_output(&output, format)?,
            Err(e) => println!("✗ {}", e),
        }
    }
    Ok(())
}

fn print_output(output: &PipelineOutput, format: OutputFormat) -> Result<()> {
    let filter = output.odata_filter.as_deref().unwrap_or("");
    match format {
        OutputFormat::Odata => println!("{}", filter),
        OutputFormat::Sql => println!("{}", output.sql.sql),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output.normalized)?),
        OutputFormat::All => {
            match &output.raw {
                Some(raw) => println!("[原始条件]: {}", raw),
                None => println!("[原始条件]: (无)"),
            }
            match &output.normalized {
                Some(normalized) => println!("[规范化]:   {}", normalized),
                None => println!("[规范化]:   (无)"),
            }
            for rewrite in &output.rewrites {
                println!("  • {:?}", rewrite);
            }
            println!("[$filter]:  {}", filter);
            println!("[SQL]:      {}", output.sql.sql);
            for opt in &output.sql.optimizations {
                println!("  • {:?}", opt);
            }
        }
    }
    Ok(())
}
