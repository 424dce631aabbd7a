#![allow(dead_code)]

use async_trait::async_trait;
use sentinel_monitor::{MonitorError, NodeStatus, Result, StatusFetcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const VALIDATOR: &str = "4F3C2A1B0E9D8C7B6A5F4E3D2C1B0A9F8E7D6C5B";
pub const OTHER_VALIDATOR: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Height(i64),
    CatchingUp(i64),
    Fail,
}

#[derive(Default)]
struct Script {
    replies: Vec<Reply>,
    calls: usize,
}

/// In-memory `StatusFetcher`; the last scripted reply repeats forever
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.scripts.lock().unwrap().insert(
            url.to_string(),
            Script { replies, calls: 0 },
        );
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.scripts.lock().unwrap().get(url).map(|s| s.calls).unwrap_or(0)
    }
}

#[async_trait]
impl StatusFetcher for ScriptedFetcher {
    async fn fetch_status(&self, endpoint: &str) -> Result<NodeStatus> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(endpoint.to_string()).or_default();
        let reply = script
            .replies
            .get(script.calls)
            .or_else(|| script.replies.last())
            .copied()
            .unwrap_or(Reply::Fail);
        script.calls += 1;

        match reply {
            Reply::Height(latest_height) => Ok(NodeStatus { latest_height, is_synced: true }),
            Reply::CatchingUp(latest_height) => Ok(NodeStatus { latest_height, is_synced: false }),
            Reply::Fail => Err(MonitorError::Status {
                url: format!("{}/status", endpoint),
                status: 502,
            }),
        }
    }
}
