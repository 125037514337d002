// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Command service demo over request/reply.
//
// Usage:
//   demo_reqrep serve <service>
//   demo_reqrep send <service> <command> [args...]
//
// The server understands "ping", "add <a> <b>", and "quit". Anything else
// comes back as an error string.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shmcomm::{Replier, Requester};

#[derive(Debug, Serialize, Deserialize)]
struct Command {
    name: String,
    args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    ok: bool,
    result: String,
}

fn execute(cmd: &Command) -> Response {
    match cmd.name.as_str() {
        "ping" => Response { ok: true, result: "pong".to_string() },
        "add" => {
            let parsed: Option<(f64, f64)> = match cmd.args.as_slice() {
                [a, b] => a.parse().ok().zip(b.parse().ok()),
                _ => None,
            };
            match parsed {
                Some((a, b)) => Response { ok: true, result: format!("{}", a + b) },
                None => Response { ok: false, result: "add wants two numbers".to_string() },
            }
        }
        other => Response { ok: false, result: format!("unknown command '{other}'") },
    }
}

fn run_server(service: &str) {
    let mut replier = Replier::new(service).expect("create replier");
    println!("serving '{service}' (send it \"quit\" to stop)");

    loop {
        let cmd: Command = match replier.recv(Some(Duration::from_secs(5))) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("recv failed: {e}");
                return;
            }
        };
        println!("request: {} {:?}", cmd.name, cmd.args);

        if cmd.name == "quit" {
            let _ = replier.send(&Response { ok: true, result: "bye".to_string() });
            return;
        }
        if !replier.send(&execute(&cmd)).expect("send reply") {
            eprintln!("reply ring full, requester gone?");
        }
    }
}

fn run_client(service: &str, name: &str, args: Vec<String>) {
    let mut requester = Requester::new(service).expect("connect requester");
    let cmd = Command { name: name.to_string(), args };

    let response: Response = requester
        .request(&cmd, Some(Duration::from_secs(2)))
        .expect("request");
    println!("{} {}", if response.ok { "ok:" } else { "error:" }, response.result);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("serve") if args.len() == 3 => run_server(&args[2]),
        Some("send") if args.len() >= 4 => {
            run_client(&args[2], &args[3], args[4..].to_vec());
        }
        _ => {
            eprintln!("usage: demo_reqrep serve <service>");
            eprintln!("       demo_reqrep send <service> <command> [args...]");
            std::process::exit(1);
        }
    }
}
