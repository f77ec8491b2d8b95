//! medflow 命令行入口

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use medflow::{
    config::load_config,
    core::{CaseRequest, OrchestratorBuilder},
    observability,
    store::RunRecord,
};
use tokio::io::AsyncReadExt;

/// medflow - 医疗病例多步编排
#[derive(Parser, Debug)]
#[command(
    name = "medflow",
    version,
    about = "Route a medical case through triage, EHR summary, literature QA, drug check and treatment planning",
    after_help = "EXAMPLES:\n    \
                  medflow run demos/pharyngitis.json\n    \
                  cat case.json | medflow run -\n    \
                  medflow --config my.toml list 5\n    \
                  medflow memory stats"
)]
struct Cli {
    /// 配置文件路径（缺省时按 config/default.toml + 环境变量加载）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// 执行一个病例，`-` 表示从 stdin 读取
    Run {
        /// 病例 JSON 文件
        source: String,
    },
    /// 最近的运行记录
    List {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
    /// 查看一条运行记录
    Show { id: i64 },
    /// 删除一条运行记录
    Delete { id: i64 },
    /// 按关键词搜索症状 / 问题 / 终态
    Search {
        #[arg(required = true, num_args = 1..)]
        keywords: Vec<String>,
    },
    /// 病例记忆维护
    #[command(subcommand)]
    Memory(MemoryCommand),
}

#[derive(Subcommand, Debug, PartialEq)]
enum MemoryCommand {
    /// 条目数与按来源统计
    Stats,
    /// 由日志重建向量索引并写快照
    Rebuild,
}

async fn read_request(source: &str) -> anyhow::Result<CaseRequest> {
    let raw = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read request from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read request file {}", source))?
    };
    serde_json::from_str(&raw).context("Request is not a valid case JSON")
}

fn print_summary(rows: &[RunRecord]) {
    if rows.is_empty() {
        println!("no runs found");
        return;
    }
    for row in rows {
        let headline = row
            .question
            .as_deref()
            .or(row.symptoms.as_deref())
            .unwrap_or("-");
        println!("{:>6}  {}  {}", row.id, row.timestamp, headline);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let Cli { config, command } = Cli::parse();
    let cfg = load_config(config).context("Failed to load configuration")?;
    let snapshot_dir = cfg.memory.snapshot_dir.clone();

    let orchestrator = OrchestratorBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build orchestrator")?;
    let store = orchestrator
        .store()
        .cloned()
        .context("Run store is not configured")?;

    match command {
        Command::Run { source } => {
            let request = read_request(&source).await?;
            let report = orchestrator.run_and_persist(&request).await;

            if let Some(dir) = &snapshot_dir {
                if let Err(e) = orchestrator.memory().snapshot(dir).await {
                    tracing::warn!(error = %e, "failed to write case memory snapshot");
                }
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_completed() {
                tracing::error!("run did not complete; partial record printed above");
            }
        }
        Command::List { limit } => print_summary(&store.list_recent(limit).await?),
        Command::Show { id } => match store.find_by_id(id).await? {
            Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
            None => bail!("run {} not found", id),
        },
        Command::Delete { id } => {
            if store.delete(id).await? {
                println!("deleted run {}", id);
            } else {
                bail!("run {} not found", id);
            }
        }
        Command::Search { keywords } => print_summary(&store.search(&keywords.join(" ")).await?),
        Command::Memory(MemoryCommand::Stats) => {
            let memory = orchestrator.memory();
            let entries = memory.entries().await;
            println!(
                "entries: {}  consistent: {}",
                entries.len(),
                memory.is_consistent().await
            );
            let mut tags: Vec<(String, usize)> = Vec::new();
            for entry in &entries {
                match tags.iter_mut().find(|(t, _)| *t == entry.source_tag) {
                    Some((_, n)) => *n += 1,
                    None => tags.push((entry.source_tag.clone(), 1)),
                }
            }
            for (tag, n) in tags {
                println!("  {:<16} {}", tag, n);
            }
        }
        Command::Memory(MemoryCommand::Rebuild) => {
            let dir = snapshot_dir.context("memory.snapshot_dir is not configured")?;
            let size = orchestrator.memory().rebuild_index().await?;
            orchestrator.memory().snapshot(&dir).await?;
            println!("index rebuilt with {} vectors", size);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["medflow", "run", "case.json"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.command, Command::Run { source: "case.json".into() });

        let cli = Cli::try_parse_from(["medflow", "--config", "my.toml", "list"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert_eq!(cli.command, Command::List { limit: 20 });

        let cli = Cli::try_parse_from(["medflow", "list", "5", "-c", "other.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
        assert_eq!(cli.command, Command::List { limit: 5 });

        let cli = Cli::try_parse_from(["medflow", "search", "chest", "pain"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Search { keywords: vec!["chest".into(), "pain".into()] }
        );

        let cli = Cli::try_parse_from(["medflow", "memory", "rebuild"]).unwrap();
        assert_eq!(cli.command, Command::Memory(MemoryCommand::Rebuild));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Cli::try_parse_from(["medflow"]).is_err());
        assert!(Cli::try_parse_from(["medflow", "show", "abc"]).is_err());
        assert!(Cli::try_parse_from(["medflow", "--config"]).is_err());
        assert!(Cli::try_parse_from(["medflow", "search"]).is_err());
        assert!(Cli::try_parse_from(["medflow", "memory", "compact"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
