//! Crash Signal Monitor CLI
//!
//! 观察远端结果流（WebSocket 推送或 HTML 轮询），分发分级信号

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crash_signal_monitor::config::{data_dir, FlatConfig, MonitorConfig, StorePaths};
use crash_signal_monitor::infra::{CookieFileCredentials, MonitorLease, PayloadArchive, PollConfig, PollTransport, PushTransport, Transport};
use crash_signal_monitor::notification::{
    AlertDispatcher, AlertFormatter, JsonlLogSink, LogNotifier, LogSink, Notifier, TelegramConfig, TelegramNotifier,
};
use crash_signal_monitor::signal::{Extraction, HeuristicPredictor, PatternExtractor};
use crash_signal_monitor::watcher::{BackoffPolicy, FeedMonitor, Monitor, Sampling};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "csm")]
#[command(about = "Crash Signal Monitor - 监控结果流并分发分级信号")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 在一个 lease 下运行所有已配置的 feed（Ctrl-C 优雅退出）
    Run {
        /// 配置文件（扁平 JSON）
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 只持久化，不转发
        #[arg(long)]
        dry_run: bool,
    },
    /// 显示最近持久化的信号
    Signals {
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 显示条数
        #[arg(long, short, default_value = "20")]
        limit: usize,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 对保存的文档运行规则选择和提取
    Extract {
        /// 文档路径
        file: PathBuf,
    },
    /// 显示 lease 文件状态
    Lease {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug csm run
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crash_signal_monitor=info,csm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, dry_run } => {
            let source = load_source(config.as_deref())?;
            let config = MonitorConfig::from_source(&source)?;
            let monitor = build_monitor(&config, dry_run)?;
            if monitor.feed_count() == 0 {
                anyhow::bail!("no feed configured");
            }

            let handle = monitor.handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    handle.request_shutdown();
                }
            });

            let finals = monitor.run().await?;
            for snapshot in finals {
                info!(
                    feed = %snapshot.feed,
                    alerts = snapshot.alerts_dispatched,
                    backoff_cycles = snapshot.backoff_cycles,
                    last_id = snapshot.last_id.as_deref().unwrap_or("-"),
                    "Feed finished"
                );
            }
        }
        Commands::Signals { config, limit, json } => {
            let source = load_source(config.as_deref())?;
            let sink = JsonlLogSink::new(StorePaths::from_source(&source).signals);
            let records = sink.read_recent(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("没有信号记录 ({})", sink.path().display());
            } else {
                for r in records {
                    let prediction = if r.prediction.expected {
                        format!("{:.1}%", r.prediction.confidence)
                    } else {
                        "-".to_string()
                    };
                    println!(
                        "{}  {:<5} {:>9.2}x  {:<4}  {}",
                        r.local_time, r.feed, r.value, r.tier.as_str(), prediction
                    );
                }
            }
        }
        Commands::Extract { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut extractor = PatternExtractor::new();

            match extractor.process(&content) {
                Extraction::Values(values) => {
                    if let Some(rule) = extractor.active_rule() {
                        println!("规则: {} ({} 次匹配)", rule.label, rule.hits);
                        println!("模式: {}", rule.pattern());
                    }
                    let rendered: Vec<String> = values.iter().map(|v| format!("{:.2}", v)).collect();
                    println!("值 ({}): {}", values.len(), rendered.join(", "));
                    if let Some(newest) = values.last() {
                        println!("最新: {:.2}", newest);
                    }
                }
                Extraction::Empty => println!("文档为空"),
                Extraction::Stalled => println!("没有规则匹配 (RUST_LOG=debug 查看候选片段)"),
            }
        }
        Commands::Lease { config } => {
            let source = load_source(config.as_deref())?;
            let path = StorePaths::from_source(&source).lease;
            match MonitorLease::inspect(&path) {
                Some(created_at) => println!("lease 已被持有: {} (创建于 {})", path.display(), created_at),
                None => println!("lease 空闲: {}", path.display()),
            }
        }
    }

    Ok(())
}

/// 配置层：文件（显式指定或默认位置）+ `CSM_` 环境变量
fn load_source(path: Option<&Path>) -> Result<FlatConfig> {
    let file = match path {
        Some(p) => FlatConfig::from_json_file(p)?,
        None => {
            let default = data_dir().join("config.json");
            if default.exists() {
                FlatConfig::from_json_file(&default)?
            } else {
                FlatConfig::new()
            }
        }
    };
    Ok(file.merge(FlatConfig::from_env_vars("CSM_", std::env::vars())))
}

fn build_monitor(config: &MonitorConfig, dry_run: bool) -> Result<Monitor> {
    let sink: Arc<dyn LogSink> = Arc::new(JsonlLogSink::new(&config.store.signals));

    let notifier: Arc<dyn Notifier> = match &config.telegram_token {
        Some(token) if !dry_run => {
            let mut telegram = TelegramConfig::new(token.clone());
            telegram.api_base = config.telegram_api_base.clone();
            Arc::new(TelegramNotifier::new(telegram).map_err(anyhow::Error::msg)?)
        }
        _ => {
            if !dry_run {
                warn!("notify.telegram_token not set, alerts are only logged");
            }
            Arc::new(LogNotifier::new())
        }
    };

    let formatter = AlertFormatter::new(config.game_name.clone())
        .with_thresholds(config.thresholds.high, config.thresholds.rare)
        .with_banner_link(config.banner_link.clone())
        .with_banner_image(config.banner_image.clone());

    let feed = |name: &str, transport: Box<dyn Transport>, sampling: Sampling| {
        let dispatcher = AlertDispatcher::new(
            sink.clone(),
            notifier.clone(),
            config.destinations.clone(),
            formatter.clone(),
        )
        .with_dry_run(dry_run);

        FeedMonitor::new(name, transport, dispatcher)
            .with_history_capacity(config.history_capacity)
            .with_thresholds(config.thresholds)
            .with_predictor(HeuristicPredictor::new(config.low_ceiling))
            .with_utc_offset(config.utc_offset)
            .with_backoff(BackoffPolicy::new(config.backoff_initial, config.backoff_max))
            .with_stall_limit(config.stall_limit)
            .with_sampling(sampling)
    };

    let mut monitor = Monitor::new(&config.store.lease);

    if let Some(push) = &config.push {
        let transport = PushTransport::new(push.url.clone()).with_idle_timeout(push.idle_timeout);
        monitor.add_feed(feed("push", Box::new(transport), Sampling::Each));
    }

    if let Some(poll) = &config.poll {
        let mut poll_config = PollConfig::new(poll.url.clone(), poll.interval);
        poll_config.timeout = poll.timeout;
        poll_config.user_agent = poll.user_agent.clone();
        poll_config.expired_marker = poll.expired_marker.clone();

        let mut transport = PollTransport::new(poll_config)?;
        if let Some(cookie_file) = &poll.cookie_file {
            transport = transport.with_credentials(Arc::new(CookieFileCredentials::new(cookie_file)));
        }
        if let Some(dir) = &config.archive_dir {
            transport = transport.with_archive(PayloadArchive::new(dir));
        }
        monitor.add_feed(feed("poll", Box::new(transport), Sampling::Newest));
    }

    info!(
        feeds = monitor.feed_count(),
        destinations = config.destinations.len(),
        lease = %monitor.lease_path().display(),
        "Monitor configured"
    );
    Ok(monitor)
}
