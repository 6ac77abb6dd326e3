//! `policy-agent chat` and `policy-agent ask`: interactive or single-message mode.

use crate::render::TerminalRenderer;
use crate::sessions::{ReplCommand, SessionStore, HELP};
use policy_agent_agent::{AgentLoop, RunOutcome, TraceObserver};
use policy_agent_config::AppConfig;
use policy_agent_core::message::Conversation;
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run one turn; Ctrl+C cancels it without leaving the process.
async fn run_turn(
    agent: &AgentLoop,
    history: &Conversation,
    input: &str,
    observer: &dyn TraceObserver,
) -> RunOutcome {
    let cancel = CancellationToken::new();
    let run = agent.run(history, input, observer, &cancel);
    tokio::pin!(run);

    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                eprintln!("\n  正在取消...");
                cancel.cancel();
            }
        }
    }
}

/// Process exit status for a finished turn. The renderer has already
/// printed the failure line, so a failed run only changes the status.
fn exit_status(outcome: &RunOutcome) -> u8 {
    if outcome.is_done() { 0 } else { 1 }
}

pub async fn ask(config: &AppConfig, message: String) -> anyhow::Result<ExitCode> {
    let agent = super::build_agent(config)?;
    let renderer = TerminalRenderer::stdout();

    let outcome = run_turn(&agent, &Conversation::new(), &message, &renderer).await;
    if let Some(reason) = outcome.failure() {
        info!(code = reason.code(), "ask finished without an answer");
    }
    Ok(ExitCode::from(exit_status(&outcome)))
}

pub async fn chat(config: &AppConfig) -> anyhow::Result<()> {
    let agent = super::build_agent(config)?;
    let renderer = TerminalRenderer::stdout();
    let mut sessions = SessionStore::new();

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Policy Agent · 政策助手 交互模式       ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", agent.model());
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!();
    println!("  试试这些：");
    println!("   - 帮我查一下深圳市政府关于政府补贴的最新政策");
    println!("   - 翻译一下这段话：Hello World");
    println!("   - 帮我给领导写一封关于海关新政的汇报邮件");
    println!();
    println!("  输入 /help 查看会话命令，exit 或 quit 退出。");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n  [{}] 你 > ", sessions.current_name());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Exit => break,
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::List => {
                for name in sessions.names() {
                    let marker = if name == sessions.current_name() { "*" } else { " " };
                    println!("  {marker} {name}");
                }
            }
            ReplCommand::New(name) => match sessions.create(&name) {
                Ok(()) => println!("  已创建并切换到会话: {}", sessions.current_name()),
                Err(e) => println!("  ⚠️  {e}"),
            },
            ReplCommand::Switch(name) => match sessions.switch(&name) {
                Ok(()) => println!("  当前会话: {}", sessions.current_name()),
                Err(e) => println!("  ⚠️  {e}"),
            },
            ReplCommand::Delete(names) => {
                if names.is_empty() {
                    println!("  ⚠️  用法: /delete NAME...");
                }
                for name in names {
                    match sessions.delete(&name) {
                        Ok(()) => println!("  已删除会话: {name}"),
                        Err(e) => println!("  ⚠️  {e}"),
                    }
                }
            }
            ReplCommand::Unknown(command) => {
                println!("  ⚠️  未知命令 /{command}，输入 /help 查看帮助");
            }
            ReplCommand::Message(input) => {
                let outcome = run_turn(&agent, sessions.history(), &input, &renderer).await;
                if let RunOutcome::Done { answer, steps, tool_calls, .. } = &outcome {
                    info!(steps, tool_calls, "Turn completed");
                    sessions.record_turn(&input, answer);
                }
            }
        }
    }

    println!();
    println!("  再见！👋");
    println!();
    Ok(())
}
