use sip_tunnel_core::probe::MirrorProbe;
use sip_tunnel_core::server::ServerAddr;

/// The `index`-th server that carries a mirror configuration.
pub(crate) fn candidate(servers: &[ServerAddr], index: usize) -> Option<&ServerAddr> {
    servers.iter().filter(|s| s.mirror().is_some()).nth(index)
}

pub(crate) fn has_candidates(servers: &[ServerAddr]) -> bool {
    candidate(servers, 0).is_some()
}

struct Candidate {
    index: usize,
    probe: Option<Box<dyn MirrorProbe>>,
}

/// Progress of the probe sequence. A run is in progress while it has a
/// current candidate; results for any other run or index are stale.
#[derive(Default)]
pub(crate) struct AutoDetect {
    run: u64,
    current: Option<Candidate>,
}

impl AutoDetect {
    pub(crate) fn in_progress(&self) -> bool {
        self.current.is_some()
    }
    pub(crate) fn run(&self) -> u64 {
        self.run
    }
    /// Abandon the current run, if any, and open a new one.
    pub(crate) fn begin(&mut self) -> u64 {
        self.stop();
        self.run += 1;
        self.run
    }
    pub(crate) fn advance(&mut self, index: usize, probe: Option<Box<dyn MirrorProbe>>) {
        self.stop();
        self.current = Some(Candidate { index, probe });
    }
    pub(crate) fn is_current(&self, run: u64, index: usize) -> bool {
        run == self.run && self.current.as_ref().is_some_and(|c| c.index == index)
    }
    pub(crate) fn stop(&mut self) {
        if let Some(mut candidate) = self.current.take() {
            if let Some(probe) = candidate.probe.as_mut() {
                probe.stop();
            }
        }
    }
}
