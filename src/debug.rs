//! Operator endpoints.
//!
//! | Path | Answer |
//! |---|---|
//! | `/debug/uptime` | time since the process started, e.g. `3h 2m 1s 40ms` |
//! | `/debug/ip` | the IPv4 address of `eth0`, or an empty body |

use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::handler::Handler;
use crate::request::Request;
use crate::response::Response;

/// Reports time elapsed since `started`.
pub fn uptime(started: Instant) -> impl Handler {
    move |_req: Request| async move { format_uptime(started.elapsed()) }
}

fn format_uptime(elapsed: Duration) -> String {
    // Microsecond precision is plenty for a human reading it.
    let trimmed = Duration::from_micros(elapsed.as_micros() as u64);
    humantime::format_duration(trimmed).to_string()
}

/// Reports the address of `eth0` as seen by `ip(8)`.
pub async fn ip(_req: Request) -> Response {
    let output = Command::new("ip")
        .args(["-f", "inet", "addr", "show", "dev", "eth0"])
        .output()
        .await;
    match output {
        Ok(out) => Response::text(parse_inet(&String::from_utf8_lossy(&out.stdout)).unwrap_or("")),
        Err(_) => Response::text(""),
    }
}

/// The address of the first `inet a.b.c.d/len` line.
fn parse_inet(output: &str) -> Option<&str> {
    let after = &output[output.find("inet ")? + "inet ".len()..];
    Some(&after[..after.find('/')?])
}
