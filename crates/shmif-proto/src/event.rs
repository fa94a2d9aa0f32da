//! Typed wire events and their fixed-size on-ring representation.
//!
//! [`RawEvent`] is what actually lives in the ring slots — plain `Copy`
//! data, no pointers, no heap. [`Event`] is the ergonomic, owned view
//! applications build and match on; `to_raw`/`from_raw` convert between
//! them, truncating any string payload that doesn't fit rather than
//! failing the whole conversion (oversize strings are clamped to the last
//! valid UTF-8 boundary at the limit, per the wire contract).

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Inline payload capacity of a [`RawEvent`], in bytes.
pub const PAYLOAD_BYTES: usize = 64;
/// Maximum length, in bytes, of any inline string payload.
pub const MESSAGE_LIMIT: usize = 56;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Category: u32 {
        const SYSTEM      = 1 << 0;
        const IO          = 1 << 1;
        const TIMER       = 1 << 2;
        const VIDEO       = 1 << 3;
        const AUDIO       = 1 << 4;
        const TARGET      = 1 << 5;
        const FRAMESERVER = 1 << 6;
        const EXTERNAL    = 1 << 7;
        const NET         = 1 << 8;
    }
}

/// The exact bytes stored in an event ring slot. `category`/`kind`
/// disambiguate how `payload` should be interpreted; unused payload bytes
/// are zero.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct RawEvent {
    pub category: u32,
    pub kind: u32,
    pub payload: [u8; PAYLOAD_BYTES],
}

impl RawEvent {
    pub fn zeroed() -> Self {
        RawEvent {
            category: 0,
            kind: 0,
            payload: [0u8; PAYLOAD_BYTES],
        }
    }
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap())
}
fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}
fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap())
}
fn write_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}
fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Truncates `s` to at most `limit` bytes, stepping back to the nearest
/// character boundary so the result is always valid UTF-8.
fn truncate_utf8(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn write_str(buf: &mut [u8], offset: usize, limit: usize, s: &str) -> Result<()> {
    let truncated = truncate_utf8(s, limit);
    let bytes = truncated.as_bytes();
    if bytes.len() > limit {
        return Err(Error::StringTooLong { limit });
    }
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    for b in &mut buf[offset + bytes.len()..offset + limit] {
        *b = 0;
    }
    Ok(())
}

fn read_str(buf: &[u8], offset: usize, limit: usize) -> String {
    let slice = &buf[offset..offset + limit];
    let len = slice.iter().position(|&b| b == 0).unwrap_or(limit);
    String::from_utf8_lossy(&slice[..len]).into_owned()
}

/// Commands flowing parent → child over the target category.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetCommand {
    Exit,
    FdTransfer,
    FrameSkip,
    StepFrame,
    CoreOpt,
    Store,
    Restore,
    Reset,
    Pause,
    Unpause,
    SetIoDev,
    Attenuate { left: f32, right: f32 },
    SeekTime { seconds: f32 },
    AudDelay { milliseconds: i32 },
    NewSegment { input: bool, tag: i32, key: String },
    ReqFail,
    GraphMode,
    VectorLineWidth(f32),
    VectorPointSize(f32),
    NtscFilter,
}

/// Notices flowing child → parent over the external category.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalNotice {
    Message(String),
    Ident(String),
    Failure(String),
    StateSize(u64),
    Resource(String),
    FlushAud,
    SegReq { width: u32, height: u32, tag: i32 },
    CursorInput { x: i32, y: i32 },
}

/// Input delivered parent → child over the io category.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Digital { devid: i32, subid: i32, active: bool },
    Analog { devid: i32, subid: i32, values: [f32; 4] },
    Translated { devid: i32, subid: i32, keysym: u32, modifiers: u16, active: bool },
    Touch { devid: i32, subid: i32, x: f32, y: f32, pressure: f32 },
}

/// Status reports child → parent (and parent → child after a resize) over
/// the frameserver category.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameserverStatus {
    Resized { width: u32, height: u32 },
    Terminated,
    DroppedFrame,
    DeliveredFrame,
    VideoSourceFound,
    VideoSourceLost,
}

/// Any event this protocol carries, owned form.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Target(TargetCommand),
    External(ExternalNotice),
    Input(InputEvent),
    Frameserver(FrameserverStatus),
}

const KIND_EXIT: u32 = 0;
const KIND_FDTRANSFER: u32 = 1;
const KIND_FRAMESKIP: u32 = 2;
const KIND_STEPFRAME: u32 = 3;
const KIND_COREOPT: u32 = 4;
const KIND_STORE: u32 = 5;
const KIND_RESTORE: u32 = 6;
const KIND_RESET: u32 = 7;
const KIND_PAUSE: u32 = 8;
const KIND_UNPAUSE: u32 = 9;
const KIND_SETIODEV: u32 = 10;
const KIND_ATTENUATE: u32 = 11;
const KIND_SEEKTIME: u32 = 12;
const KIND_AUDDELAY: u32 = 13;
const KIND_NEWSEGMENT: u32 = 14;
const KIND_REQFAIL: u32 = 15;
const KIND_GRAPHMODE: u32 = 16;
const KIND_VECTOR_LINEWIDTH: u32 = 17;
const KIND_VECTOR_POINTSIZE: u32 = 18;
const KIND_NTSCFILTER: u32 = 19;

const KIND_MESSAGE: u32 = 0;
const KIND_IDENT: u32 = 1;
const KIND_FAILURE: u32 = 2;
const KIND_STATESIZE: u32 = 3;
const KIND_RESOURCE: u32 = 4;
const KIND_FLUSHAUD: u32 = 5;
const KIND_SEGREQ: u32 = 6;
const KIND_CURSORINPUT: u32 = 7;

const KIND_DIGITAL: u32 = 0;
const KIND_ANALOG: u32 = 1;
const KIND_TRANSLATED: u32 = 2;
const KIND_TOUCH: u32 = 3;

const KIND_FSRV_RESIZED: u32 = 0;
const KIND_FSRV_TERMINATED: u32 = 1;
const KIND_FSRV_DROPPEDFRAME: u32 = 2;
const KIND_FSRV_DELIVEREDFRAME: u32 = 3;
const KIND_FSRV_VIDEOSOURCE_FOUND: u32 = 4;
const KIND_FSRV_VIDEOSOURCE_LOST: u32 = 5;

impl Event {
    pub fn to_raw(&self) -> Result<RawEvent> {
        let mut raw = RawEvent::zeroed();
        match self {
            Event::Target(cmd) => {
                raw.category = Category::TARGET.bits();
                let p = &mut raw.payload;
                match cmd {
                    TargetCommand::Exit => raw.kind = KIND_EXIT,
                    TargetCommand::FdTransfer => raw.kind = KIND_FDTRANSFER,
                    TargetCommand::FrameSkip => raw.kind = KIND_FRAMESKIP,
                    TargetCommand::StepFrame => raw.kind = KIND_STEPFRAME,
                    TargetCommand::CoreOpt => raw.kind = KIND_COREOPT,
                    TargetCommand::Store => raw.kind = KIND_STORE,
                    TargetCommand::Restore => raw.kind = KIND_RESTORE,
                    TargetCommand::Reset => raw.kind = KIND_RESET,
                    TargetCommand::Pause => raw.kind = KIND_PAUSE,
                    TargetCommand::Unpause => raw.kind = KIND_UNPAUSE,
                    TargetCommand::SetIoDev => raw.kind = KIND_SETIODEV,
                    TargetCommand::Attenuate { left, right } => {
                        raw.kind = KIND_ATTENUATE;
                        write_f32(p, 0, *left);
                        write_f32(p, 4, *right);
                    }
                    TargetCommand::SeekTime { seconds } => {
                        raw.kind = KIND_SEEKTIME;
                        write_f32(p, 0, *seconds);
                    }
                    TargetCommand::AudDelay { milliseconds } => {
                        raw.kind = KIND_AUDDELAY;
                        write_i32(p, 0, *milliseconds);
                    }
                    TargetCommand::NewSegment { input, tag, key } => {
                        raw.kind = KIND_NEWSEGMENT;
                        write_u32(p, 0, *input as u32);
                        write_i32(p, 4, *tag);
                        write_str(p, 8, MESSAGE_LIMIT, key)?;
                    }
                    TargetCommand::ReqFail => raw.kind = KIND_REQFAIL,
                    TargetCommand::GraphMode => raw.kind = KIND_GRAPHMODE,
                    TargetCommand::VectorLineWidth(v) => {
                        raw.kind = KIND_VECTOR_LINEWIDTH;
                        write_f32(p, 0, *v);
                    }
                    TargetCommand::VectorPointSize(v) => {
                        raw.kind = KIND_VECTOR_POINTSIZE;
                        write_f32(p, 0, *v);
                    }
                    TargetCommand::NtscFilter => raw.kind = KIND_NTSCFILTER,
                }
            }
            Event::External(notice) => {
                raw.category = Category::EXTERNAL.bits();
                let p = &mut raw.payload;
                match notice {
                    ExternalNotice::Message(s) => {
                        raw.kind = KIND_MESSAGE;
                        write_str(p, 0, MESSAGE_LIMIT, s)?;
                    }
                    ExternalNotice::Ident(s) => {
                        raw.kind = KIND_IDENT;
                        write_str(p, 0, MESSAGE_LIMIT, s)?;
                    }
                    ExternalNotice::Failure(s) => {
                        raw.kind = KIND_FAILURE;
                        write_str(p, 0, MESSAGE_LIMIT, s)?;
                    }
                    ExternalNotice::StateSize(sz) => {
                        raw.kind = KIND_STATESIZE;
                        p[0..8].copy_from_slice(&sz.to_ne_bytes());
                    }
                    ExternalNotice::Resource(s) => {
                        raw.kind = KIND_RESOURCE;
                        write_str(p, 0, MESSAGE_LIMIT, s)?;
                    }
                    ExternalNotice::FlushAud => raw.kind = KIND_FLUSHAUD,
                    ExternalNotice::SegReq { width, height, tag } => {
                        raw.kind = KIND_SEGREQ;
                        write_u32(p, 0, *width);
                        write_u32(p, 4, *height);
                        write_i32(p, 8, *tag);
                    }
                    ExternalNotice::CursorInput { x, y } => {
                        raw.kind = KIND_CURSORINPUT;
                        write_i32(p, 0, *x);
                        write_i32(p, 4, *y);
                    }
                }
            }
            Event::Input(input) => {
                raw.category = Category::IO.bits();
                let p = &mut raw.payload;
                match input {
                    InputEvent::Digital { devid, subid, active } => {
                        raw.kind = KIND_DIGITAL;
                        write_i32(p, 0, *devid);
                        write_i32(p, 4, *subid);
                        write_u32(p, 8, *active as u32);
                    }
                    InputEvent::Analog { devid, subid, values } => {
                        raw.kind = KIND_ANALOG;
                        write_i32(p, 0, *devid);
                        write_i32(p, 4, *subid);
                        for (i, v) in values.iter().enumerate() {
                            write_f32(p, 8 + i * 4, *v);
                        }
                    }
                    InputEvent::Translated { devid, subid, keysym, modifiers, active } => {
                        raw.kind = KIND_TRANSLATED;
                        write_i32(p, 0, *devid);
                        write_i32(p, 4, *subid);
                        write_u32(p, 8, *keysym);
                        p[12..14].copy_from_slice(&modifiers.to_ne_bytes());
                        write_u32(p, 16, *active as u32);
                    }
                    InputEvent::Touch { devid, subid, x, y, pressure } => {
                        raw.kind = KIND_TOUCH;
                        write_i32(p, 0, *devid);
                        write_i32(p, 4, *subid);
                        write_f32(p, 8, *x);
                        write_f32(p, 12, *y);
                        write_f32(p, 16, *pressure);
                    }
                }
            }
            Event::Frameserver(status) => {
                raw.category = Category::FRAMESERVER.bits();
                let p = &mut raw.payload;
                match status {
                    FrameserverStatus::Resized { width, height } => {
                        raw.kind = KIND_FSRV_RESIZED;
                        write_u32(p, 0, *width);
                        write_u32(p, 4, *height);
                    }
                    FrameserverStatus::Terminated => raw.kind = KIND_FSRV_TERMINATED,
                    FrameserverStatus::DroppedFrame => raw.kind = KIND_FSRV_DROPPEDFRAME,
                    FrameserverStatus::DeliveredFrame => raw.kind = KIND_FSRV_DELIVEREDFRAME,
                    FrameserverStatus::VideoSourceFound => raw.kind = KIND_FSRV_VIDEOSOURCE_FOUND,
                    FrameserverStatus::VideoSourceLost => raw.kind = KIND_FSRV_VIDEOSOURCE_LOST,
                }
            }
        }
        Ok(raw)
    }

    pub fn from_raw(raw: &RawEvent) -> Option<Event> {
        let category = Category::from_bits_truncate(raw.category);
        let p = &raw.payload;
        if category.contains(Category::TARGET) {
            let cmd = match raw.kind {
                KIND_EXIT => TargetCommand::Exit,
                KIND_FDTRANSFER => TargetCommand::FdTransfer,
                KIND_FRAMESKIP => TargetCommand::FrameSkip,
                KIND_STEPFRAME => TargetCommand::StepFrame,
                KIND_COREOPT => TargetCommand::CoreOpt,
                KIND_STORE => TargetCommand::Store,
                KIND_RESTORE => TargetCommand::Restore,
                KIND_RESET => TargetCommand::Reset,
                KIND_PAUSE => TargetCommand::Pause,
                KIND_UNPAUSE => TargetCommand::Unpause,
                KIND_SETIODEV => TargetCommand::SetIoDev,
                KIND_ATTENUATE => TargetCommand::Attenuate { left: read_f32(p, 0), right: read_f32(p, 4) },
                KIND_SEEKTIME => TargetCommand::SeekTime { seconds: read_f32(p, 0) },
                KIND_AUDDELAY => TargetCommand::AudDelay { milliseconds: read_i32(p, 0) },
                KIND_NEWSEGMENT => TargetCommand::NewSegment {
                    input: read_u32(p, 0) != 0,
                    tag: read_i32(p, 4),
                    key: read_str(p, 8, MESSAGE_LIMIT),
                },
                KIND_REQFAIL => TargetCommand::ReqFail,
                KIND_GRAPHMODE => TargetCommand::GraphMode,
                KIND_VECTOR_LINEWIDTH => TargetCommand::VectorLineWidth(read_f32(p, 0)),
                KIND_VECTOR_POINTSIZE => TargetCommand::VectorPointSize(read_f32(p, 0)),
                KIND_NTSCFILTER => TargetCommand::NtscFilter,
                _ => return None,
            };
            return Some(Event::Target(cmd));
        }
        if category.contains(Category::EXTERNAL) {
            let notice = match raw.kind {
                KIND_MESSAGE => ExternalNotice::Message(read_str(p, 0, MESSAGE_LIMIT)),
                KIND_IDENT => ExternalNotice::Ident(read_str(p, 0, MESSAGE_LIMIT)),
                KIND_FAILURE => ExternalNotice::Failure(read_str(p, 0, MESSAGE_LIMIT)),
                KIND_STATESIZE => ExternalNotice::StateSize(u64::from_ne_bytes(p[0..8].try_into().unwrap())),
                KIND_RESOURCE => ExternalNotice::Resource(read_str(p, 0, MESSAGE_LIMIT)),
                KIND_FLUSHAUD => ExternalNotice::FlushAud,
                KIND_SEGREQ => ExternalNotice::SegReq {
                    width: read_u32(p, 0),
                    height: read_u32(p, 4),
                    tag: read_i32(p, 8),
                },
                KIND_CURSORINPUT => ExternalNotice::CursorInput { x: read_i32(p, 0), y: read_i32(p, 4) },
                _ => return None,
            };
            return Some(Event::External(notice));
        }
        if category.contains(Category::IO) {
            let input = match raw.kind {
                KIND_DIGITAL => InputEvent::Digital {
                    devid: read_i32(p, 0),
                    subid: read_i32(p, 4),
                    active: read_u32(p, 8) != 0,
                },
                KIND_ANALOG => InputEvent::Analog {
                    devid: read_i32(p, 0),
                    subid: read_i32(p, 4),
                    values: [read_f32(p, 8), read_f32(p, 12), read_f32(p, 16), read_f32(p, 20)],
                },
                KIND_TRANSLATED => InputEvent::Translated {
                    devid: read_i32(p, 0),
                    subid: read_i32(p, 4),
                    keysym: read_u32(p, 8),
                    modifiers: u16::from_ne_bytes(p[12..14].try_into().unwrap()),
                    active: read_u32(p, 16) != 0,
                },
                KIND_TOUCH => InputEvent::Touch {
                    devid: read_i32(p, 0),
                    subid: read_i32(p, 4),
                    x: read_f32(p, 8),
                    y: read_f32(p, 12),
                    pressure: read_f32(p, 16),
                },
                _ => return None,
            };
            return Some(Event::Input(input));
        }
        if category.contains(Category::FRAMESERVER) {
            let status = match raw.kind {
                KIND_FSRV_RESIZED => FrameserverStatus::Resized { width: read_u32(p, 0), height: read_u32(p, 4) },
                KIND_FSRV_TERMINATED => FrameserverStatus::Terminated,
                KIND_FSRV_DROPPEDFRAME => FrameserverStatus::DroppedFrame,
                KIND_FSRV_DELIVEREDFRAME => FrameserverStatus::DeliveredFrame,
                KIND_FSRV_VIDEOSOURCE_FOUND => FrameserverStatus::VideoSourceFound,
                KIND_FSRV_VIDEOSOURCE_LOST => FrameserverStatus::VideoSourceLost,
                _ => return None,
            };
            return Some(Event::Frameserver(status));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ev: Event) {
        let raw = ev.to_raw().expect("encode");
        let back = Event::from_raw(&raw).expect("decode");
        assert_eq!(ev, back);
    }

    #[test]
    fn target_exit_roundtrips() {
        roundtrip(Event::Target(TargetCommand::Exit));
    }

    #[test]
    fn new_segment_carries_key() {
        roundtrip(Event::Target(TargetCommand::NewSegment {
            input: true,
            tag: 7,
            key: "sub-segment-key".to_string(),
        }));
    }

    #[test]
    fn oversize_message_is_truncated_to_valid_utf8() {
        let long = "x".repeat(200);
        let ev = Event::External(ExternalNotice::Message(long));
        let raw = ev.to_raw().expect("truncation, not failure");
        match Event::from_raw(&raw).unwrap() {
            Event::External(ExternalNotice::Message(s)) => assert_eq!(s.len(), MESSAGE_LIMIT),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn input_digital_roundtrips() {
        roundtrip(Event::Input(InputEvent::Digital { devid: 1, subid: 2, active: true }));
    }

    #[test]
    fn frameserver_resized_roundtrips() {
        roundtrip(Event::Frameserver(FrameserverStatus::Resized { width: 1920, height: 1080 }));
    }
}
