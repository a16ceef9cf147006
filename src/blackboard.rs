use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use skyward_kinematics::{Pose, RcCommand};

#[derive(Clone)]
pub struct State {
    pub pose: Pose,
    pub command: RcCommand,
    pub flying: bool,
    pub proximity_raw: Option<f64>,
    pub last_cmd_ts: Instant,
    pub faults: Vec<String>,
    pub shutdown: bool,
}

impl Default for State {
    fn default() -> Self {
        State {
            pose: Pose::default(),
            command: RcCommand::hover(),
            flying: false,
            proximity_raw: None,
            last_cmd_ts: Instant::now(),
            faults: Vec::new(),
            shutdown: false,
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn touch_cmd(bb: &Blackboard, command: RcCommand) {
    let mut g = bb.write();
    g.command = command;
    g.last_cmd_ts = Instant::now();
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}
