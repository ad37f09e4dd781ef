// Entry point for the `ghexec` binary.

use clap::Parser;
use ghexec_common::constants::variables;
use ghexec_common::logging::init_tracing;
use ghexec_common::HostContext;

use ghexec_worker::cli::{self, Cli};

fn main() {
    let args = Cli::parse();
    init_tracing(std::env::var(variables::RUNNER_DEBUG).as_deref() == Ok("1"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async move { run(args).await });
    std::process::exit(exit_code);
}

async fn run(args: Cli) -> i32 {
    let host_context = HostContext::new();

    let context_for_signal = host_context.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            context_for_signal.shutdown("Ctrl-C received");
        }
    });

    match cli::execute(args, host_context).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    }
}
