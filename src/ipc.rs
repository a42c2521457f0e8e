use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::PathBuf;

const FRAME_LEN_BYTES: usize = std::mem::size_of::<u32>();
const MAX_FRAME_BYTES: usize = 1024 * 1024;

pub const INITIALIZE_CHANNEL: &str = "main_initializes_userscripts";

/// Where the host keeps scripts and their saved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPaths {
    pub userscripts_path: PathBuf,
    pub userscript_prefs_path: PathBuf,
}

/// One-shot messages the host sends to the runtime. None of them expect a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostMessage {
    InitializeUserscripts(BootstrapPaths),
}

impl HostMessage {
    pub fn channel(&self) -> &'static str {
        match self {
            HostMessage::InitializeUserscripts(_) => INITIALIZE_CHANNEL,
        }
    }
}

pub fn send_message<W: Write>(writer: &mut W, message: &HostMessage) -> io::Result<()> {
    send_frame(writer, message)
}

/// Blocks until the next host message arrives. `Ok(None)` means the host closed the stream
/// between frames; a frame cut off partway is `InvalidData`.
pub fn recv_message<R: Read>(reader: &mut R) -> io::Result<Option<HostMessage>> {
    recv_frame(reader)
}

fn send_frame<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: Write,
    T: Serialize,
{
    let payload = bincode_options().serialize(value).map_err(to_io_error)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

fn recv_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; FRAME_LEN_BYTES];
    let mut filled = 0;
    while filled < FRAME_LEN_BYTES {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(truncated("length header")),
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("frame of {len} bytes exceeds limit")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => truncated("payload"),
        _ => err,
    })?;
    bincode_options().deserialize(&payload).map(Some).map_err(to_io_error)
}

fn truncated(part: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("frame {part} cut off before end of stream"))
}

fn bincode_options() -> impl bincode::Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

fn to_io_error(err: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
