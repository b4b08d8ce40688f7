//! `UsbStack`: the external collaborator that actually presents the SCSI
//! adapter on the wire (`spec.md` §6). The USB peripheral driver and Bulk-Only
//! Transport loop live outside this crate; only the start/stop/connected
//! surface is modeled here.

/// Starts, stops, and reports link status for the USB mass-storage
/// interface. A real host wires this to its USB peripheral driver's
/// composite-device registration; tests use [`NullUsbStack`].
pub trait UsbStack: Send {
    fn start(&mut self, vid_pid: (u16, u16)) -> std::io::Result<()>;
    fn stop(&mut self) -> std::io::Result<()>;
    fn connected(&self) -> bool;
}

/// A `UsbStack` that never actually talks to hardware, for hosts and tests
/// that only exercise the `AppMounted` side of the bridge.
#[derive(Default)]
pub struct NullUsbStack {
    running: bool,
}

impl UsbStack for NullUsbStack {
    fn start(&mut self, _vid_pid: (u16, u16)) -> std::io::Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        self.running = false;
        Ok(())
    }

    fn connected(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_stack_tracks_start_stop() {
        let mut stack = NullUsbStack::default();
        assert!(!stack.connected());
        stack.start((0x1234, 0x5678)).unwrap();
        assert!(stack.connected());
        stack.stop().unwrap();
        assert!(!stack.connected());
    }
}
