//! An in-process stand-in for the debug port, used by unit tests

use std::{
    collections::{BTreeMap, VecDeque},
    io::{self, Read, Write},
    sync::{Arc, Mutex, MutexGuard},
};

use super::command::{lrc, CommandType, RequestHeader, HEADER_LEN, RESPONSE_SYNC};

/// A decoded request as seen by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub command: CommandType,
    pub address: u32,
    pub length: u16,
    pub data: Vec<u8>,
    pub lrc_ok: bool,
}

#[derive(Debug, Default)]
struct State {
    input: Vec<u8>,
    output: VecDeque<u8>,
    memory: BTreeMap<u32, u8>,
    requests: Vec<Request>,
    revision: u8,
    silent: bool,
}

/// Emulated debug port; clones share the same state
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision(self, revision: u8) -> Self {
        self.state().revision = revision;
        self
    }

    /// Never answer any request
    pub fn silent(self) -> Self {
        self.state().silent = true;
        self
    }

    /// Queue bytes which the host will see before the next response
    pub fn inject_noise(&self, bytes: &[u8]) {
        self.state().output.extend(bytes);
    }

    /// Preload device memory
    pub fn load(&self, address: u32, data: &[u8]) {
        let mut state = self.state();
        for (offset, byte) in data.iter().enumerate() {
            state.memory.insert(address + offset as u32, *byte);
        }
    }

    /// Read back device memory; unwritten bytes read as zero
    pub fn memory(&self, address: u32, len: usize) -> Vec<u8> {
        let state = self.state();
        (0..len as u32)
            .map(|offset| state.memory.get(&(address + offset)).copied().unwrap_or(0))
            .collect()
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    /// The sequence of command types received so far
    pub fn commands(&self) -> Vec<CommandType> {
        self.state().requests.iter().map(|r| r.command).collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn process_input(&mut self) {
        while self.input.len() >= HEADER_LEN {
            let header = RequestHeader::from_bytes(self.input[..HEADER_LEN].try_into().unwrap());
            let command = CommandType::from_code(header.command)
                .unwrap_or_else(|| panic!("unknown command code {:#04x}", header.command));

            let data_len = if command.has_request_data() {
                header.length() as usize
            } else {
                0
            };
            let frame_len = HEADER_LEN + data_len + 1;
            if self.input.len() < frame_len {
                return;
            }

            let frame: Vec<u8> = self.input.drain(..frame_len).collect();
            let data = frame[HEADER_LEN..HEADER_LEN + data_len].to_vec();
            let request = Request {
                command,
                address: header.address(),
                length: header.length(),
                lrc_ok: frame[frame_len - 1] == lrc(&header, &data),
                data,
            };

            self.respond(&request);
            self.requests.push(request);
        }
    }

    fn respond(&mut self, request: &Request) {
        let mut payload = Vec::new();

        match request.command {
            CommandType::WriteMem => {
                for (offset, byte) in request.data.iter().enumerate() {
                    self.memory.insert(request.address + offset as u32, *byte);
                }
            }
            CommandType::ReadMem => {
                payload = (0..request.length as u32)
                    .map(|offset| {
                        self.memory
                            .get(&(request.address + offset))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect();
            }
            _ => {}
        }

        if self.silent {
            return;
        }

        let status = [0x00, self.revision];
        let checksum = payload
            .iter()
            .chain(&status)
            .fold(RESPONSE_SYNC, |acc, byte| acc ^ byte);

        self.output.push_back(RESPONSE_SYNC);
        self.output.extend(status);
        self.output.extend(payload);
        self.output.push_back(checksum);
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.input.extend_from_slice(buf);
        state.process_input();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        let len = buf.len().min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}
