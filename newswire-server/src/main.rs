// Copyright 2025 Newswire Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use newswire_server::config::GatewayConfig;
use newswire_server::run_gateway;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "newswire-server", version, about = "Multi-protocol tool gateway")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "NEWSWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long, env = "NEWSWIRE_HTTP_ADDR")]
    listen: Option<String>,

    /// Also serve newline-delimited JSON-RPC on stdin/stdout
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = GatewayConfig::load(args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if args.stdio {
        config.protocols.stdio = true;
    }

    run_gateway(config).await
}
