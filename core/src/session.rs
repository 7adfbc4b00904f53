//! One connection's worth of state: the inbound decoder, the outbound cipher
//! and the world they both feed.
//!
//! Decoding and simulation alternate on the caller's thread. Callers push
//! bytes with [`GameSession::receive`], drain them with
//! [`GameSession::process_incoming`] and call [`GameSession::tick`] at the
//! tick rate.

use log::{debug, error, warn};

use crate::constants::{MAX_FRAMES_PER_POLL, RECONNECT_IDLE_TICKS};
use crate::error::{ProtocolError, ProtocolResult, RouteError};
use crate::isaac::{Isaac, SessionCiphers};
use crate::packet::PacketWriter;
use crate::protocol::opcodes::{CLIENT_MOVE_GAMECLICK, CLIENT_MOVE_OPCLICK};
use crate::protocol::{dispatch, FrameDecoder};
use crate::world::{InteractionTarget, World};

/// Why the session gave up on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Nothing arrived for this many ticks.
    Idle(u32),
    Fatal(ProtocolError),
}

/// Called when the connection should be re-established.
pub trait ReconnectHook {
    fn reconnect(&mut self, reason: &Disconnect);
}

/// Logs and does nothing else.
#[derive(Debug, Default)]
pub struct LogReconnect;

impl ReconnectHook for LogReconnect {
    fn reconnect(&mut self, reason: &Disconnect) {
        warn!("connection lost: {reason:?}");
    }
}

/// A routed walk waiting for the next tick's flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub opcode: u8,
    /// Region-local turn points, source side first.
    pub waypoints: Vec<(i32, i32)>,
    pub run: bool,
}

impl MoveRequest {
    /// Appends the request: the first waypoint absolute, the rest as byte
    /// deltas from it.
    pub fn encode(&self, cipher: &mut Isaac, base_x: i32, base_z: i32, w: &mut PacketWriter) {
        let Some(&(start_x, start_z)) = self.waypoints.first() else {
            return;
        };
        w.p1isaac(self.opcode, cipher);
        w.p1((self.waypoints.len() * 2 + 3) as u8);
        w.p2((start_x + base_x) as u16);
        w.p2((start_z + base_z) as u16);
        for &(x, z) in &self.waypoints[1..] {
            w.p1((x - start_x) as i8 as u8);
            w.p1((z - start_z) as i8 as u8);
        }
        w.p1(self.run as u8);
    }
}

pub struct GameSession {
    decoder: FrameDecoder,
    encoder: Isaac,
    pub world: World,
    pending_move: Option<MoveRequest>,
    outbound: PacketWriter,
    hook: Box<dyn ReconnectHook>,
    fatal: Option<ProtocolError>,
}

impl GameSession {
    pub fn new(world: World, seed: [u32; 4]) -> Self {
        let SessionCiphers { decoder, encoder } = SessionCiphers::from_seed(seed);
        GameSession {
            decoder: FrameDecoder::new(decoder),
            encoder,
            world,
            pending_move: None,
            outbound: PacketWriter::new(),
            hook: Box::new(LogReconnect),
            fatal: None,
        }
    }

    pub fn with_reconnect_hook(mut self, hook: Box<dyn ReconnectHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn receive(&mut self, bytes: &[u8]) {
        self.decoder.push(bytes);
    }

    /// Received bytes not yet dispatched.
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }

    /// The error that ended decoding, if any.
    pub fn fatal_error(&self) -> Option<&ProtocolError> {
        self.fatal.as_ref()
    }

    pub fn pending_move(&self) -> Option<&MoveRequest> {
        self.pending_move.as_ref()
    }

    /// Dispatches buffered frames, at most [`MAX_FRAMES_PER_POLL`] per call.
    /// Returns how many were handled.
    pub fn process_incoming(&mut self) -> ProtocolResult<usize> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }

        let mut handled = 0;
        while handled < MAX_FRAMES_PER_POLL {
            let frame = match self.decoder.poll() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(self.fail(err)),
            };
            self.world.telemetry.record_frame(frame.body.len());
            if let Err(err) = dispatch(&mut self.world, &frame) {
                return Err(self.fail(err));
            }
            handled += 1;
        }
        if handled == MAX_FRAMES_PER_POLL && self.decoder.buffered() > 0 {
            debug!("frame budget spent, {} bytes left over", self.decoder.buffered());
        }
        Ok(handled)
    }

    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        error!("protocol error: {err}");
        let reason = Disconnect::Fatal(err.clone());
        self.fatal = Some(err.clone());
        self.hook.reconnect(&reason);
        err
    }

    /// Advances the world one tick, then flushes any pending move.
    pub fn tick(&mut self) {
        self.world.advance(1);

        if let Some(request) = self.pending_move.take() {
            request.encode(&mut self.encoder, self.world.base_x, self.world.base_z, &mut self.outbound);
        }

        let idle = self.world.telemetry.idle_ticks;
        if idle >= RECONNECT_IDLE_TICKS {
            self.hook.reconnect(&Disconnect::Idle(idle));
            self.world.telemetry.idle_ticks = 0;
        }
    }

    /// Routes the local player to `target`. A successful route replaces any
    /// move still waiting to be sent.
    pub fn request_move(&mut self, target: InteractionTarget, run: bool) -> Result<usize, RouteError> {
        let try_nearest = matches!(target, InteractionTarget::Tile { .. });
        let route = self.world.route_to(target, try_nearest)?;
        let opcode = match target {
            InteractionTarget::Tile { .. } => CLIENT_MOVE_GAMECLICK,
            _ => CLIENT_MOVE_OPCLICK,
        };
        let count = route.waypoints.len();
        self.pending_move = Some(MoveRequest {
            opcode,
            waypoints: route.waypoints,
            run,
        });
        Ok(count)
    }

    /// Bytes queued for the server since the last call.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound).into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::protocol::{write_frame, ServerProt};
    use crate::types::TypeTables;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SEED: [u32; 4] = [11, 22, 33, 44];

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Disconnect>>>);

    impl ReconnectHook for Recorder {
        fn reconnect(&mut self, reason: &Disconnect) {
            self.0.borrow_mut().push(reason.clone());
        }
    }

    fn session() -> (GameSession, Recorder) {
        let recorder = Recorder::default();
        let mut world = World::new(TypeTables::default());
        let types = world.types.clone();
        world.local_player_mut().entity.teleport(&types, true, 50, 50);
        let session = GameSession::new(world, SEED).with_reconnect_hook(Box::new(recorder.clone()));
        (session, recorder)
    }

    fn server_cipher() -> Isaac {
        SessionCiphers::from_seed(SEED).decoder
    }

    #[test]
    fn frames_are_dispatched_and_counted() {
        let (mut session, _) = session();
        let mut cipher = server_cipher();
        let mut bytes = Vec::new();
        write_frame(&mut cipher, ServerProt::UpdatePid, &[0, 3], &mut bytes);
        write_frame(&mut cipher, ServerProt::MessageGame, b"Hi\n", &mut bytes);

        session.receive(&bytes[..3]);
        assert_eq!(session.process_incoming().unwrap(), 1);
        session.receive(&bytes[3..]);
        assert_eq!(session.process_incoming().unwrap(), 1);
        assert_eq!(session.world.local_pid, 3);
        assert_eq!(session.world.telemetry.frames_decoded, 2);
    }

    #[test]
    fn frame_budget_is_bounded() {
        let (mut session, _) = session();
        let mut cipher = server_cipher();
        let mut bytes = Vec::new();
        for _ in 0..MAX_FRAMES_PER_POLL + 5 {
            write_frame(&mut cipher, ServerProt::ResetAnims, &[], &mut bytes);
        }
        session.receive(&bytes);
        assert_eq!(session.process_incoming().unwrap(), MAX_FRAMES_PER_POLL);
        assert_eq!(session.buffered(), 5);
        assert_eq!(session.process_incoming().unwrap(), 5);
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn fatal_error_sticks_and_fires_hook() {
        let (mut session, recorder) = session();
        let mut cipher = server_cipher();
        let mut bytes = Vec::new();
        write_frame(&mut cipher, ServerProt::MessageGame, b"no terminator", &mut bytes);
        session.receive(&bytes);

        assert!(matches!(
            session.process_incoming(),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(session.fatal_error().is_some());
        assert!(session.process_incoming().is_err());
        assert_eq!(recorder.0.borrow().len(), 1);
    }

    #[test]
    fn idle_connection_fires_hook() {
        let (mut session, recorder) = session();
        for _ in 0..RECONNECT_IDLE_TICKS - 1 {
            session.tick();
        }
        assert!(recorder.0.borrow().is_empty());
        session.tick();
        assert_eq!(
            recorder.0.borrow().as_slice(),
            &[Disconnect::Idle(RECONNECT_IDLE_TICKS)]
        );
    }

    #[test]
    fn move_request_supersedes_and_encodes() {
        let (mut session, _) = session();
        session.world.base_x = 3200;
        session.world.base_z = 3200;
        session
            .request_move(InteractionTarget::Tile { x: 60, z: 50 }, false)
            .unwrap();
        let count = session
            .request_move(InteractionTarget::Tile { x: 52, z: 53 }, true)
            .unwrap();
        assert_eq!(session.pending_move().map(|m| m.waypoints.len()), Some(count));
        session.tick();
        assert!(session.pending_move().is_none());

        let out = session.take_outbound();
        let mut client_cipher = SessionCiphers::from_seed(SEED).encoder;
        assert_eq!(out[0].wrapping_sub(client_cipher.next_int() as u8), CLIENT_MOVE_GAMECLICK);

        let mut p = Packet::new(&out[1..]);
        let size = p.g1().unwrap() as usize;
        assert_eq!(size, count * 2 + 3);
        assert_eq!(p.remaining(), size);
        let (start_x, start_z) = (p.g2().unwrap(), p.g2().unwrap());
        let mut last = (start_x as i32 - 3200, start_z as i32 - 3200);
        for _ in 1..count {
            last = (
                start_x as i32 - 3200 + p.g1b().unwrap() as i32,
                start_z as i32 - 3200 + p.g1b().unwrap() as i32,
            );
        }
        assert_eq!(last, (52, 53));
        assert_eq!(p.g1().unwrap(), 1);
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn failed_route_keeps_previous_move() {
        let (mut session, _) = session();
        session
            .request_move(InteractionTarget::Tile { x: 55, z: 50 }, false)
            .unwrap();
        assert_eq!(
            session.request_move(InteractionTarget::Npc(9), false),
            Err(RouteError::TargetGone)
        );
        assert!(session.pending_move().is_some());
    }
}
