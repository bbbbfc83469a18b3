//! The musical transport: tempo, position in bars, loop and swing on top of a [`Clock`], with
//! registries of payloads scheduled in ticks that are handed to a [`DispatchSink`] at the exact
//! time of their tick.

mod sink;
mod timeout;

pub use self::sink::{DispatchLog, DispatchSink};

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;

use failure::Fail;
use log::{debug, trace, warn};

use crate::clock::{round_ticks, Clock, ClockEvent, PlaybackState};
use crate::config::Config;
use crate::disposable::Disposable;
use crate::signal::TickSignal;
use crate::time::{
  BarsTime, NotationError, Ppq, Progress, Seconds, Signature, Tempo, TicksTime, TimeSource,
};
use crate::timeline::{EventId, IntervalTimeline, TimelineError};

use self::timeout::TimeoutQueue;

pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_PPQ: Ppq = 192;
const DEFAULT_LOOP_BARS: u64 = 4;

#[derive(Debug, Fail)]
pub enum TransportError {
  #[fail(display = "Invalid position: {}", cause)]
  Notation { cause: NotationError },

  #[fail(display = "Invalid schedule: {}", cause)]
  Timeline { cause: TimelineError },

  #[fail(display = "Repeat intervals must be longer than zero ticks")]
  ZeroInterval,

  #[fail(display = "Invalid tempo: {} bpm", bpm)]
  InvalidTempo { bpm: f64 },

  #[fail(display = "Invalid resolution: {} ticks per quarter", ppq)]
  InvalidPpq { ppq: Ppq },

  #[fail(display = "Invalid time signature: {}/{}", num_beats, note_value)]
  InvalidSignature { num_beats: u8, note_value: u8 },

  #[fail(display = "The transport was disposed")]
  Disposed,
}

impl From<NotationError> for TransportError {
  fn from(cause: NotationError) -> TransportError {
    TransportError::Notation { cause }
  }
}

impl From<TimelineError> for TransportError {
  fn from(cause: TimelineError) -> TransportError {
    TransportError::Timeline { cause }
  }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
  Start {
    time: Seconds,
    offset: Option<TicksTime>,
  },
  Pause {
    time: Seconds,
  },
  Stop {
    time: Seconds,
  },
  LoopEnd {
    time: Seconds,
  },
  LoopStart {
    time: Seconds,
    ticks: TicksTime,
  },
  Loop {
    time: Seconds,
  },
}

impl From<ClockEvent> for TransportEvent {
  fn from(event: ClockEvent) -> TransportEvent {
    match event {
      ClockEvent::Start { time, offset } => TransportEvent::Start {
        time,
        offset: offset.map(TicksTime::from_f64),
      },
      ClockEvent::Pause { time } => TransportEvent::Pause { time },
      ClockEvent::Stop { time } => TransportEvent::Stop { time },
    }
  }
}

pub type TransportListener = Box<dyn FnMut(&TransportEvent)>;

#[derive(Debug, Clone)]
struct Interval<P> {
  start: TicksTime,
  every: TicksTime,
  payload: P,
}

pub struct Transport<P, D> {
  clock: Clock,
  clock_events: Rc<RefCell<Vec<ClockEvent>>>,

  ppq: Ppq,
  signature: Signature,

  loop_enabled: bool,
  loop_start: TicksTime,
  loop_end: TicksTime,

  swing: f64,
  swing_subdivision: TicksTime,

  timeouts: TimeoutQueue<P>,
  intervals: IntervalTimeline<Interval<P>>,

  listeners: Vec<TransportListener>,
  sink: D,
  disposable: Disposable,
}

impl<P, D: DispatchSink<P>> Transport<P, D> {
  /// A stopped transport at 120 bpm, 192 ticks per quarter and 4/4.
  pub fn new(time_source: Rc<dyn TimeSource>, sink: D) -> Transport<P, D> {
    Transport::build(
      time_source,
      sink,
      DEFAULT_BPM,
      DEFAULT_PPQ,
      Signature::default(),
    )
  }

  pub fn from_config(
    config: &Config,
    time_source: Rc<dyn TimeSource>,
    sink: D,
  ) -> TransportResult<Transport<P, D>> {
    let settings = &config.transport;
    check_bpm(settings.bpm)?;
    check_ppq(settings.ppq)?;
    let [num_beats, note_value] = settings.signature;
    let signature =
      Signature::try_new(num_beats, note_value).ok_or(TransportError::InvalidSignature {
        num_beats,
        note_value,
      })?;

    let mut transport = Transport::build(time_source, sink, settings.bpm, settings.ppq, signature);
    transport.set_look_ahead(config.clock.look_ahead);
    transport.set_loop_points(settings.loop_start.as_str(), settings.loop_end.as_str())?;
    transport.set_loop(settings.loop_enabled);
    transport.set_swing(settings.swing);
    transport.set_swing_subdivision(settings.swing_subdivision.as_str())?;
    Ok(transport)
  }

  fn build(
    time_source: Rc<dyn TimeSource>,
    sink: D,
    bpm: f64,
    ppq: Ppq,
    signature: Signature,
  ) -> Transport<P, D> {
    let frequency = TickSignal::with_multiplier(bpm, Tempo::multiplier(ppq));
    let mut clock = Clock::with_signal(frequency, time_source);

    let clock_events = Rc::new(RefCell::new(Vec::new()));
    let queue = clock_events.clone();
    clock.subscribe(move |event| queue.borrow_mut().push(*event));

    Transport {
      clock,
      clock_events,

      ppq,
      signature,

      loop_enabled: false,
      loop_start: TicksTime::zero(),
      loop_end: TicksTime::per_bar(signature, ppq) * DEFAULT_LOOP_BARS,

      swing: 0.0,
      swing_subdivision: TicksTime::per_quarter(ppq) / 2,

      timeouts: TimeoutQueue::new(),
      intervals: IntervalTimeline::new(),

      listeners: Vec::new(),
      sink,
      disposable: Disposable::new(),
    }
  }

  pub fn sink(&self) -> &D {
    &self.sink
  }

  pub fn sink_mut(&mut self) -> &mut D {
    &mut self.sink
  }

  pub fn clock(&self) -> &Clock {
    &self.clock
  }

  pub fn now(&self) -> Seconds {
    self.clock.now()
  }

  pub fn look_ahead(&self) -> Seconds {
    self.clock.look_ahead()
  }

  pub fn set_look_ahead(&mut self, look_ahead: Seconds) {
    self.clock.set_look_ahead(look_ahead);
  }

  pub fn subscribe<F>(&mut self, listener: F)
  where
    F: FnMut(&TransportEvent) + 'static,
  {
    self.listeners.push(Box::new(listener));
  }

  fn emit(&mut self, event: TransportEvent) {
    debug!("Transport {:?}", event);
    for listener in self.listeners.iter_mut() {
      listener(&event);
    }
  }

  fn forward_clock_events(&mut self) {
    let events: Vec<ClockEvent> = self.clock_events.borrow_mut().drain(..).collect();
    for event in events {
      self.emit(TransportEvent::from(event));
    }
  }

  fn guard(&self) -> TransportResult<()> {
    if self.disposable.is_disposed() {
      Err(TransportError::Disposed)
    } else {
      Ok(())
    }
  }

  // Playback

  pub fn state(&self) -> PlaybackState {
    self.clock.state()
  }

  pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
    self.clock.get_state_at_time(time)
  }

  /// Starts at `time` from the current position.
  pub fn start(&mut self, time: Seconds) -> &mut Self {
    self.clock.start(time, None);
    self.forward_clock_events();
    self
  }

  /// Starts at `time` from `offset`.
  pub fn start_from<'a, T>(&mut self, time: Seconds, offset: T) -> TransportResult<&mut Self>
  where
    T: Into<Progress<'a>>,
  {
    let offset = self.progress_to_ticks(offset)?;
    self.clock.start(time, Some(f64::from(offset)));
    self.timeouts.rebind(offset);
    self.forward_clock_events();
    Ok(self)
  }

  pub fn pause(&mut self, time: Seconds) -> &mut Self {
    self.clock.pause(time);
    self.forward_clock_events();
    self
  }

  pub fn stop(&mut self, time: Seconds) -> &mut Self {
    self.clock.stop(time);
    self.timeouts.rebind(TicksTime::zero());
    self.forward_clock_events();
    self
  }

  /// Stops when started at `time`, starts otherwise.
  pub fn toggle(&mut self, time: Seconds) -> &mut Self {
    if self.get_state_at_time(time) == PlaybackState::Started {
      self.stop(time)
    } else {
      self.start(time)
    }
  }

  // Tempo and resolution

  pub fn bpm(&self) -> f64 {
    self.get_bpm_at_time(self.now())
  }

  pub fn get_bpm_at_time(&self, time: Seconds) -> f64 {
    self.clock.frequency().get_value_at_time(time)
  }

  pub fn set_bpm(&mut self, bpm: f64) -> TransportResult<()> {
    self.set_tempo(bpm, 0.0)
  }

  /// Changes the tempo from now on, as a step or as a linear ramp lasting `ramp_time`.
  pub fn set_tempo(&mut self, bpm: f64, ramp_time: Seconds) -> TransportResult<()> {
    self.guard()?;
    check_bpm(bpm)?;
    let now = self.now();
    debug!("Tempo {} -> {} bpm over {}s at {}", self.bpm(), bpm, ramp_time, now);
    self.clock.with_frequency(|frequency| {
      if ramp_time > 0.0 {
        frequency.linear_ramp_to(bpm, ramp_time, now)
      } else {
        frequency.cancel_scheduled_values(now);
        frequency.set_value_at_time(bpm, now)
      }
    })?;
    Ok(())
  }

  pub fn ppq(&self) -> Ppq {
    self.ppq
  }

  /// Changes the tick resolution keeping the tempo in bpm.
  pub fn set_ppq(&mut self, ppq: Ppq) -> TransportResult<()> {
    check_ppq(ppq)?;
    debug!("Resolution {} -> {} ppq", self.ppq, ppq);
    self.ppq = ppq;
    self
      .clock
      .with_frequency(|frequency| frequency.set_multiplier(Tempo::multiplier(ppq)));
    Ok(())
  }

  pub fn signature(&self) -> Signature {
    self.signature
  }

  pub fn set_signature(&mut self, signature: Signature) {
    self.signature = signature;
  }

  // Position

  /// Rounded ticks of a quarter number, a `bars:beats:sixteenths` position or notation text.
  pub fn progress_to_ticks<'a, T>(&self, position: T) -> TransportResult<TicksTime>
  where
    T: Into<Progress<'a>>,
  {
    let ticks = position.into().to_ticks(self.ppq, self.signature)?;
    Ok(TicksTime::from_f64(ticks))
  }

  pub fn ticks_to_progress(&self, ticks: TicksTime) -> BarsTime {
    BarsTime::from_ticks(ticks, self.signature, self.ppq)
  }

  pub fn ticks(&self) -> TicksTime {
    TicksTime::new(self.clock.ticks())
  }

  pub fn set_ticks(&mut self, ticks: TicksTime) {
    self.clock.set_ticks(u64::from(ticks));
    self.timeouts.rebind(ticks);
  }

  pub fn position(&self) -> BarsTime {
    self.ticks_to_progress(self.ticks())
  }

  pub fn set_position<'a, T>(&mut self, position: T) -> TransportResult<()>
  where
    T: Into<Progress<'a>>,
  {
    let ticks = self.progress_to_ticks(position)?;
    self.set_ticks(ticks);
    Ok(())
  }

  pub fn seconds(&self) -> Seconds {
    self.clock.seconds()
  }

  // Loop

  pub fn is_loop_enabled(&self) -> bool {
    self.loop_enabled
  }

  pub fn set_loop(&mut self, enabled: bool) {
    self.loop_enabled = enabled;
  }

  pub fn loop_start(&self) -> TicksTime {
    self.loop_start
  }

  pub fn loop_end(&self) -> TicksTime {
    self.loop_end
  }

  pub fn set_loop_start<'a, T>(&mut self, position: T) -> TransportResult<()>
  where
    T: Into<Progress<'a>>,
  {
    self.loop_start = self.progress_to_ticks(position)?;
    Ok(())
  }

  pub fn set_loop_end<'a, T>(&mut self, position: T) -> TransportResult<()>
  where
    T: Into<Progress<'a>>,
  {
    self.loop_end = self.progress_to_ticks(position)?;
    Ok(())
  }

  pub fn set_loop_points<'a, 'b, S, E>(&mut self, start: S, end: E) -> TransportResult<()>
  where
    S: Into<Progress<'a>>,
    E: Into<Progress<'b>>,
  {
    let start = self.progress_to_ticks(start)?;
    let end = self.progress_to_ticks(end)?;
    self.loop_start = start;
    self.loop_end = end;
    Ok(())
  }

  fn loops(&self) -> bool {
    self.loop_enabled && self.loop_end > self.loop_start
  }

  /// Where now falls inside the loop, from 0 at the start to 1 at the end. Zero when not looping.
  pub fn progress(&self) -> f64 {
    if !self.loops() {
      return 0.0;
    }
    let ticks = self.clock.get_ticks_at_time(self.now());
    let start = f64::from(self.loop_start);
    let end = f64::from(self.loop_end);
    (ticks - start) / (end - start)
  }

  // Swing

  pub fn swing(&self) -> f64 {
    self.swing
  }

  /// The share of the swing subdivision that off-beats are delayed by, from 0 to 1.
  pub fn set_swing(&mut self, amount: f64) {
    self.swing = amount.max(0.0).min(1.0);
  }

  pub fn swing_subdivision(&self) -> TicksTime {
    self.swing_subdivision
  }

  pub fn set_swing_subdivision<'a, T>(&mut self, subdivision: T) -> TransportResult<()>
  where
    T: Into<Progress<'a>>,
  {
    self.swing_subdivision = self.progress_to_ticks(subdivision)?;
    Ok(())
  }

  fn swing_delay(&self, time: Seconds, ticks: TicksTime) -> Seconds {
    let ticks = u64::from(ticks);
    let period = u64::from(self.swing_subdivision) * 2;
    if self.swing <= 0.0 || period == 0 {
      return 0.0;
    }
    if ticks % u64::from(self.ppq) == 0 || ticks % period == 0 {
      return 0.0;
    }
    let progress = (ticks % period) as f64 / period as f64;
    let amount = (progress * PI).sin() * self.swing;
    self.clock.frequency().ticks_to_time(period as f64 / 3.0, time) * amount
  }

  /// The time of the next `subdivision` boundary after now, or zero when not started.
  pub fn next_subdivision<'a, T>(&self, subdivision: T) -> TransportResult<Seconds>
  where
    T: Into<Progress<'a>>,
  {
    let subdivision = f64::from(self.progress_to_ticks(subdivision)?);
    if subdivision <= 0.0 {
      return Err(TransportError::ZeroInterval);
    }
    let now = self.now();
    if self.get_state_at_time(now) != PlaybackState::Started {
      return Ok(0.0);
    }
    let ticks = self.clock.get_ticks_at_time(now);
    let remaining = subdivision - ticks % subdivision;
    Ok(self.clock.next_tick_time(remaining, now))
  }

  // Scheduling

  /// Dispatches `payload` whenever the transport reaches `at`.
  pub fn schedule<'a, T>(&mut self, payload: P, at: T) -> TransportResult<EventId>
  where
    T: Into<Progress<'a>>,
  {
    self.add_timeout(payload, at, false)
  }

  /// Dispatches `payload` the first time the transport reaches `at`.
  pub fn schedule_once<'a, T>(&mut self, payload: P, at: T) -> TransportResult<EventId>
  where
    T: Into<Progress<'a>>,
  {
    self.add_timeout(payload, at, true)
  }

  /// Dispatches `payload` once, `delay` after the current position.
  pub fn set_timeout<'a, T>(&mut self, payload: P, delay: T) -> TransportResult<EventId>
  where
    T: Into<Progress<'a>>,
  {
    let delay = self.progress_to_ticks(delay)?;
    let at = self.ticks() + delay;
    self.add_timeout(payload, at, true)
  }

  fn add_timeout<'a, T>(&mut self, payload: P, at: T, once: bool) -> TransportResult<EventId>
  where
    T: Into<Progress<'a>>,
  {
    self.guard()?;
    let tick = self.progress_to_ticks(at)?;
    let id = self.timeouts.add(tick, payload, once);
    trace!("Timeout {:?} at {} (once={})", id, tick, once);
    Ok(id)
  }

  /// Dispatches `payload` every `every` from `start`, for `duration` or forever.
  pub fn schedule_repeat<'a, 'b, E, S>(
    &mut self,
    payload: P,
    every: E,
    start: S,
    duration: Option<Progress>,
  ) -> TransportResult<EventId>
  where
    E: Into<Progress<'a>>,
    S: Into<Progress<'b>>,
  {
    self.guard()?;
    let every = self.progress_to_ticks(every)?;
    if every.is_zero() {
      return Err(TransportError::ZeroInterval);
    }
    let start = self.progress_to_ticks(start)?;
    let duration = match duration {
      Some(duration) => f64::from(self.progress_to_ticks(duration)?),
      None => std::f64::INFINITY,
    };
    let interval = Interval {
      start,
      every,
      payload,
    };
    let id = self.intervals.add(f64::from(start), duration, interval)?;
    trace!("Interval {:?} every {} from {} for {}", id, every, start, duration);
    Ok(id)
  }

  /// Dispatches `payload` every `every` from the current position on.
  pub fn set_interval<'a, T>(&mut self, payload: P, every: T) -> TransportResult<EventId>
  where
    T: Into<Progress<'a>>,
  {
    let start = self.ticks();
    self.schedule_repeat(payload, every, start, None)
  }

  /// Removes a timeout or an interval. Returns whether it existed.
  pub fn clear(&mut self, id: EventId) -> bool {
    self.timeouts.remove(id) || self.intervals.remove(id).is_some()
  }

  /// Removes every timeout at or after `after` and every interval starting at or after it.
  pub fn cancel<'a, T>(&mut self, after: T) -> TransportResult<()>
  where
    T: Into<Progress<'a>>,
  {
    let after = self.progress_to_ticks(after)?;
    debug!(
      "Cancelling schedules from {} out of {} timeouts and {} intervals",
      after,
      self.timeouts.len(),
      self.intervals.len()
    );
    self.timeouts.cancel(after);
    self.intervals.cancel(f64::from(after));
    Ok(())
  }

  // Dispatch

  /// Dispatches everything due between the previous update and now.
  pub fn update(&mut self) {
    if self.disposable.is_disposed() {
      warn!("Ignoring update on a disposed transport");
      return;
    }
    for time in self.clock.pending_tick_times() {
      let ticks = TicksTime::new(round_ticks(self.clock.get_ticks_at_time(time)));
      self.process_tick(time, ticks);
    }
  }

  fn process_tick(&mut self, time: Seconds, ticks: TicksTime) {
    let mut ticks = ticks;
    if self.loops() && ticks >= self.loop_end {
      self.emit(TransportEvent::LoopEnd { time });
      self.clock.set_ticks_at_time(f64::from(self.loop_start), time);
      ticks = self.loop_start;
      self.timeouts.rebind(ticks);
      self.emit(TransportEvent::LoopStart { time, ticks });
      self.emit(TransportEvent::Loop { time });
    }

    let time = time + self.swing_delay(time, ticks);
    trace!("Tick {} at {}", ticks, time);

    for event in self.intervals.search(f64::from(ticks)) {
      let interval = event.value();
      if ((ticks - interval.start) % interval.every).is_zero() {
        self.sink.dispatch(time, &interval.payload);
      }
    }

    let mut fired = Vec::new();
    for index in self.timeouts.due(ticks) {
      if let Some(event) = self.timeouts.get_at(index) {
        let timeout = event.value();
        self.sink.dispatch(time, &timeout.payload);
        if timeout.once {
          fired.push(event.id());
        }
      }
    }
    for id in fired {
      self.timeouts.remove(id);
    }
  }

  pub fn dispose(&mut self) {
    if self.disposable.dispose() {
      self.clock.dispose();
      self.timeouts.clear();
      self.intervals.dispose();
      self.listeners.clear();
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.disposable.is_disposed()
  }
}

fn check_bpm(bpm: f64) -> TransportResult<()> {
  if bpm.is_finite() && bpm > 0.0 {
    Ok(())
  } else {
    Err(TransportError::InvalidTempo { bpm })
  }
}

fn check_ppq(ppq: Ppq) -> TransportResult<()> {
  if ppq > 0 {
    Ok(())
  } else {
    Err(TransportError::InvalidPpq { ppq })
  }
}
