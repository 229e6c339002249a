//! A DTB simulated in memory.
//!
//! The simulation honours the same queue/flush contract as a real board:
//! calls sent with [`DeviceSession::send`] only take effect once the queue
//! is flushed. Every executed call is recorded in order so tests can check
//! what actually reached the board.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::trace;

use super::DeviceSession;
use crate::commands::{
    decode, encode, CalibrateDacDacScan, CalibrateDacScan, CalibrateMap, CalibrateMapResponse, CalibratePixel,
    CalibratePixelResponse, CalibrateScanResponse, DaqOpen, DaqRead, DaqReadResponse, Supply, HOST_CALLS,
};
use crate::errors::DeviceError;
use crate::pixel::{ROC_NUMCOLS, ROC_NUMROWS};

/// Largest number of words a single simulated `Daq_Read` returns
pub const SIM_MAX_TRANSFER: u32 = 0x8000;

/// Largest buffer a simulated channel allocates
pub const SIM_MAX_BUFFER: u32 = 0x0400_0000;

/// A call as it was executed by the simulated board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub name: String,
    pub args: Vec<u8>,
}

/// The deserializer selected on the simulated board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deserializer {
    Deser160 { phase: u8 },
    Deser400,
}

/// One simulated DAQ channel
#[derive(Debug, Clone, Default)]
pub struct SimChannel {
    pub open: bool,
    pub running: bool,
    pub capacity: u32,
    pub buffer: Vec<u16>,
}

/// An in-memory DTB
#[derive(Debug)]
pub struct SimulatedDevice {
    name: String,
    open: bool,
    call_table: Vec<String>,
    queue: Vec<RecordedCall>,
    executed: Vec<RecordedCall>,
    fail_on: Option<String>,

    board_id: u16,
    supplies: HashMap<&'static str, u16>,
    powered: bool,
    hv: bool,
    delays: HashMap<u8, u16>,
    levels: HashMap<u8, u8>,
    probes: HashMap<&'static str, u8>,
    pg: BTreeMap<u16, u16>,
    triggers: u32,

    roc_addr: u8,
    hub_addr: u8,
    tbm_enabled: bool,
    tbm_regs: HashMap<u8, u8>,
    dacs: HashMap<(u8, u8), u8>,
    trims: HashMap<u8, Vec<i16>>,
    masked_rocs: HashSet<u8>,
    masked_pixels: HashSet<(u8, u8, u8)>,
    col_enable: HashMap<(u8, u8), bool>,
    cal_pixels: HashSet<(u8, u8, u8)>,

    deser: Option<Deserializer>,
    channels: [SimChannel; 2],
    max_transfer: u32,
    read_budget: Option<u32>,

    map_response: Option<CalibrateMapResponse>,
    scan_response: Option<CalibrateScanResponse>,

    upgrade_version: u16,
    upgrade_records: Vec<String>,
    upgrade_error: u8,
    upgrade_msg: String,
    upgrade_exec: Option<u16>,
}

impl SimulatedDevice {
    pub fn new(name: &str) -> Self {
        SimulatedDevice {
            name: name.to_string(),
            open: true,
            call_table: HOST_CALLS.iter().map(|c| c.to_string()).collect(),
            queue: Vec::new(),
            executed: Vec::new(),
            fail_on: None,
            board_id: 42,
            supplies: HashMap::new(),
            powered: false,
            hv: false,
            delays: HashMap::new(),
            levels: HashMap::new(),
            probes: HashMap::new(),
            pg: BTreeMap::new(),
            triggers: 0,
            roc_addr: 0,
            hub_addr: 0,
            tbm_enabled: false,
            tbm_regs: HashMap::new(),
            dacs: HashMap::new(),
            trims: HashMap::new(),
            masked_rocs: HashSet::new(),
            masked_pixels: HashSet::new(),
            col_enable: HashMap::new(),
            cal_pixels: HashSet::new(),
            deser: None,
            channels: [SimChannel::default(), SimChannel::default()],
            max_transfer: SIM_MAX_TRANSFER,
            read_budget: None,
            map_response: None,
            scan_response: None,
            upgrade_version: 0x0100,
            upgrade_records: Vec::new(),
            upgrade_error: 0,
            upgrade_msg: String::new(),
            upgrade_exec: None,
        }
    }

    /// Replaces the call table advertised by the firmware
    pub fn set_call_table(&mut self, table: Vec<String>) {
        self.call_table = table;
    }

    /// Makes every execution of the named call fail with an I/O error
    pub fn fail_on(&mut self, call: Option<&str>) {
        self.fail_on = call.map(str::to_string);
    }

    /// Overrides the arrays returned by `CalibrateMap`
    pub fn set_map_response(&mut self, response: Option<CalibrateMapResponse>) {
        self.map_response = response;
    }

    /// Overrides the arrays returned by the DAC scans
    pub fn set_scan_response(&mut self, response: Option<CalibrateScanResponse>) {
        self.scan_response = response;
    }

    /// Limits how many words a single `Daq_Read` returns
    pub fn set_max_transfer(&mut self, words: u32) {
        self.max_transfer = words;
    }

    /// Lets `Daq_Read` hand out only `words` more words in total, after that
    /// it returns empty blocks while the data stays buffered. `None` lifts
    /// the limit.
    pub fn set_stall_after(&mut self, words: Option<u32>) {
        self.read_budget = words;
    }

    /// Sets the upgrade protocol version the board reports
    pub fn set_upgrade_version(&mut self, version: u16) {
        self.upgrade_version = version;
    }

    /// Every executed call, in execution order
    pub fn executed(&self) -> &[RecordedCall] {
        &self.executed
    }

    /// Names of every executed call, in execution order
    pub fn executed_names(&self) -> Vec<&str> {
        self.executed.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of calls waiting for a flush
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn clear_log(&mut self) {
        self.executed.clear();
    }

    pub fn supply(&self, supply: Supply) -> u16 {
        *self.supplies.get(supply_key(supply)).unwrap_or(&0)
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn is_hv_on(&self) -> bool {
        self.hv
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn delay(&self, signal: u8) -> Option<u16> {
        self.delays.get(&signal).copied()
    }

    pub fn level(&self, signal: u8) -> Option<u8> {
        self.levels.get(&signal).copied()
    }

    pub fn probe(&self, probe: &str) -> Option<u8> {
        self.probes.get(probe).copied()
    }

    /// The pattern generator memory as (address, word) pairs
    pub fn pattern_generator(&self) -> Vec<(u16, u16)> {
        self.pg.iter().map(|(a, w)| (*a, *w)).collect()
    }

    pub fn triggers(&self) -> u32 {
        self.triggers
    }

    pub fn hub_address(&self) -> u8 {
        self.hub_addr
    }

    pub fn is_tbm_enabled(&self) -> bool {
        self.tbm_enabled
    }

    pub fn tbm_reg(&self, reg: u8) -> Option<u8> {
        self.tbm_regs.get(&reg).copied()
    }

    pub fn dac(&self, roc: u8, dac: u8) -> Option<u8> {
        self.dacs.get(&(roc, dac)).copied()
    }

    pub fn trims(&self, roc: u8) -> Option<&[i16]> {
        self.trims.get(&roc).map(|t| t.as_slice())
    }

    pub fn is_roc_masked(&self, roc: u8) -> bool {
        self.masked_rocs.contains(&roc)
    }

    pub fn is_pixel_masked(&self, roc: u8, column: u8, row: u8) -> bool {
        self.masked_pixels.contains(&(roc, column, row))
    }

    pub fn column_enabled(&self, roc: u8, column: u8) -> Option<bool> {
        self.col_enable.get(&(roc, column)).copied()
    }

    pub fn is_calibrate_set(&self, roc: u8, column: u8, row: u8) -> bool {
        self.cal_pixels.contains(&(roc, column, row))
    }

    pub fn deserializer(&self) -> Option<Deserializer> {
        self.deser
    }

    pub fn channel(&self, channel: u8) -> &SimChannel {
        &self.channels[channel as usize & 1]
    }

    pub fn upgrade_records(&self) -> &[String] {
        &self.upgrade_records
    }

    pub fn upgrade_exec(&self) -> Option<u16> {
        self.upgrade_exec
    }

    fn check_open(&self) -> Result<(), DeviceError> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::Closed)
        }
    }

    fn pixel_responds(&self, column: u8, row: u8) -> bool {
        !self.masked_rocs.contains(&self.roc_addr)
            && !self.masked_pixels.contains(&(self.roc_addr, column, row))
    }

    /// Executes one call and returns its encoded return value
    fn execute(&mut self, name: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        if self.fail_on.as_deref() == Some(name) {
            return Err(DeviceError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("simulated failure in {name}"),
            )));
        }

        trace!("Simulating {name}");
        self.executed.push(RecordedCall {
            name: name.to_string(),
            args: args.to_vec(),
        });

        let out = match name {
            "GetRpcCallCount" => encode(&(self.call_table.len() as i32))?,
            "GetRpcCallName" => {
                let id: i32 = decode(args)?;
                match self.call_table.get(id as usize) {
                    Some(n) if id >= 0 => encode(&(true, n))?,
                    _ => encode(&(false, ""))?,
                }
            }
            "GetInfo" => encode(&format!(
                "Board id:    {}\nHW version:  DTB1.2\nFW version:  4.6\nSW version:  4.6\n",
                self.board_id
            ))?,
            "GetBoardId" => encode(&self.board_id)?,
            "Welcome" | "uDelay" => Vec::new(),
            "Init" => {
                self.powered = false;
                self.hv = false;
                Vec::new()
            }
            "_SetVA" | "_SetVD" | "_SetIA" | "_SetID" => {
                let v: u16 = decode(args)?;
                self.supplies.insert(supply_key_for(&name[4..]), v);
                Vec::new()
            }
            "_GetVA" | "_GetVD" | "_GetIA" | "_GetID" => {
                let key = supply_key_for(&name[4..]);
                // Only a powered board draws current
                let v = match (key, self.powered) {
                    ("IA", false) | ("ID", false) => 0,
                    _ => *self.supplies.get(key).unwrap_or(&0),
                };
                encode(&v)?
            }
            "Pon" | "Poff" => {
                self.powered = name == "Pon";
                Vec::new()
            }
            "HVon" | "HVoff" => {
                self.hv = name == "HVon";
                Vec::new()
            }
            "Sig_SetDelay" => {
                let (signal, delay): (u8, u16) = decode(args)?;
                self.delays.insert(signal, delay);
                Vec::new()
            }
            "Sig_SetLevel" => {
                let (signal, level): (u8, u8) = decode(args)?;
                self.levels.insert(signal, level);
                Vec::new()
            }
            "SignalProbeD1" | "SignalProbeD2" | "SignalProbeA1" | "SignalProbeA2" => {
                let key = match name {
                    "SignalProbeD1" => "D1",
                    "SignalProbeD2" => "D2",
                    "SignalProbeA1" => "A1",
                    _ => "A2",
                };
                self.probes.insert(key, decode(args)?);
                Vec::new()
            }
            "Pg_SetCmd" => {
                let (addr, word): (u16, u16) = decode(args)?;
                self.pg.insert(addr, word);
                Vec::new()
            }
            "Pg_Single" => {
                self.trigger();
                Vec::new()
            }
            "roc_I2cAddr" => {
                self.roc_addr = decode(args)?;
                Vec::new()
            }
            "roc_SetDAC" => {
                let (dac, value): (u8, u8) = decode(args)?;
                self.dacs.insert((self.roc_addr, dac), value);
                Vec::new()
            }
            "roc_Chip_Mask" => {
                self.masked_rocs.insert(self.roc_addr);
                for col in 0..ROC_NUMCOLS {
                    self.col_enable.insert((self.roc_addr, col), false);
                }
                Vec::new()
            }
            "roc_Col_Enable" => {
                let (col, enable): (u8, bool) = decode(args)?;
                self.col_enable.insert((self.roc_addr, col), enable);
                Vec::new()
            }
            "roc_Pix_Mask" => {
                let (col, row): (u8, u8) = decode(args)?;
                self.masked_pixels.insert((self.roc_addr, col, row));
                Vec::new()
            }
            "roc_Pix_Trim" => {
                let (col, row, trim): (u8, u8, u8) = decode(args)?;
                self.masked_pixels.remove(&(self.roc_addr, col, row));
                let trims = self
                    .trims
                    .entry(self.roc_addr)
                    .or_insert_with(|| vec![15; ROC_NUMCOLS as usize * ROC_NUMROWS as usize]);
                if let Some(t) = trims.get_mut(col as usize * ROC_NUMROWS as usize + row as usize) {
                    *t = trim as i16;
                }
                Vec::new()
            }
            "roc_Pix_Cal" => {
                let (col, row, _sensor): (u8, u8, bool) = decode(args)?;
                self.cal_pixels.insert((self.roc_addr, col, row));
                Vec::new()
            }
            "roc_ClrCal" => {
                let roc = self.roc_addr;
                self.cal_pixels.retain(|p| p.0 != roc);
                Vec::new()
            }
            "TrimChip" => {
                let trims: Vec<i16> = decode(args)?;
                let roc = self.roc_addr;
                self.masked_rocs.remove(&roc);
                self.masked_pixels.retain(|p| p.0 != roc);
                self.trims.insert(roc, trims);
                Vec::new()
            }
            "tbm_Enable" => {
                self.tbm_enabled = decode(args)?;
                Vec::new()
            }
            "mod_Addr" => {
                self.hub_addr = decode(args)?;
                Vec::new()
            }
            "tbm_Set" => {
                let (reg, value): (u8, u8) = decode(args)?;
                self.tbm_regs.insert(reg, value);
                Vec::new()
            }
            "Daq_Open" => {
                let open: DaqOpen = decode(args)?;
                let ch = &mut self.channels[open.channel as usize & 1];
                ch.open = true;
                ch.running = false;
                ch.capacity = open.buffer_size.min(SIM_MAX_BUFFER);
                ch.buffer.clear();
                encode(&ch.capacity)?
            }
            "Daq_Close" => {
                let channel: u8 = decode(args)?;
                self.channels[channel as usize & 1] = SimChannel::default();
                Vec::new()
            }
            "Daq_Start" => {
                let channel: u8 = decode(args)?;
                let ch = &mut self.channels[channel as usize & 1];
                ch.running = ch.open;
                Vec::new()
            }
            "Daq_Stop" => {
                let channel: u8 = decode(args)?;
                self.channels[channel as usize & 1].running = false;
                Vec::new()
            }
            "Daq_Select_Deser160" => {
                self.deser = Some(Deserializer::Deser160 { phase: decode(args)? });
                Vec::new()
            }
            "Daq_Select_Deser400" => {
                self.deser = Some(Deserializer::Deser400);
                Vec::new()
            }
            "Daq_GetSize" => {
                let channel: u8 = decode(args)?;
                encode(&(self.channels[channel as usize & 1].buffer.len() as u32))?
            }
            "Daq_Read" => {
                let read: DaqRead = decode(args)?;
                let mut n = read.block_size.min(self.max_transfer);
                if let Some(budget) = self.read_budget.as_mut() {
                    n = n.min(*budget);
                }

                let ch = &mut self.channels[read.channel as usize & 1];
                let n = (n as usize).min(ch.buffer.len());
                let data: Vec<u16> = ch.buffer.drain(..n).collect();
                let remaining = ch.buffer.len() as u32;
                if let Some(budget) = self.read_budget.as_mut() {
                    *budget -= n as u32;
                }
                encode(&DaqReadResponse {
                    status: 0,
                    data,
                    remaining,
                })?
            }
            "CalibrateMap" => {
                let map: CalibrateMap = decode(args)?;
                let response = match &self.map_response {
                    Some(resp) => resp.clone(),
                    None => self.simulate_map(map.triggers),
                };
                encode(&response)?
            }
            "CalibratePixel" => {
                let pixel: CalibratePixel = decode(args)?;
                let responds = self.pixel_responds(pixel.column as u8, pixel.row as u8);
                let readouts = if responds { pixel.triggers } else { 0 };
                encode(&CalibratePixelResponse {
                    status: 0,
                    readouts,
                    ph_sum: readouts as i32 * (pixel.column as i32 + pixel.row as i32),
                })?
            }
            "CalibrateDacScan" => {
                let scan: CalibrateDacScan = decode(args)?;
                let max = scan.dac_max.max(0) as usize;
                let response = match &self.scan_response {
                    Some(resp) => resp.clone(),
                    None => CalibrateScanResponse {
                        status: 0,
                        readouts: (0..max)
                            .map(|i| if i >= max / 2 { scan.triggers } else { 0 })
                            .collect(),
                        ph_sums: (0..max).map(|i| i as i32 * 1000).collect(),
                    },
                };
                encode(&response)?
            }
            "CalibrateDacDacScan" => {
                let scan: CalibrateDacDacScan = decode(args)?;
                let max1 = scan.dac1_max.max(0) as usize;
                let max2 = scan.dac2_max.max(0) as usize;
                let response = match &self.scan_response {
                    Some(resp) => resp.clone(),
                    None => {
                        let points = (0..max1).flat_map(|i| (0..max2).map(move |j| (i, j)));
                        let (readouts, ph_sums) = points
                            .map(|(i, j)| {
                                let hit = if (i + j) % 2 == 0 { scan.triggers } else { 0 };
                                (hit, (i * 1000 + j) as i32)
                            })
                            .unzip();
                        CalibrateScanResponse {
                            status: 0,
                            readouts,
                            ph_sums,
                        }
                    }
                };
                encode(&response)?
            }
            "UpgradeGetVersion" => encode(&self.upgrade_version)?,
            "UpgradeStart" => {
                let version: u16 = decode(args)?;
                self.upgrade_records.clear();
                self.upgrade_error = 0;
                if version == self.upgrade_version {
                    encode(&0u8)?
                } else {
                    self.upgrade_msg = format!("unsupported upgrade version {version:#06x}");
                    encode(&1u8)?
                }
            }
            "UpgradeData" => {
                let record: String = decode(args)?;
                if record.starts_with(':') {
                    self.upgrade_records.push(record);
                    encode(&0u8)?
                } else {
                    self.upgrade_error = 1;
                    self.upgrade_msg = format!("invalid record {}", self.upgrade_records.len() + 1);
                    encode(&1u8)?
                }
            }
            "UpgradeError" => encode(&self.upgrade_error)?,
            "UpgradeErrorMsg" => encode(&self.upgrade_msg)?,
            "UpgradeExec" => {
                self.upgrade_exec = Some(decode(args)?);
                Vec::new()
            }
            other => return Err(DeviceError::UnknownCall(other.to_string())),
        };

        Ok(out)
    }

    /// One pattern generator run: every running channel records an event
    fn trigger(&mut self) {
        self.triggers += 1;
        let tag = (self.triggers & 0x0fff) as u16;

        for (i, ch) in self.channels.iter_mut().enumerate() {
            if !ch.running || ch.buffer.len() + 2 > ch.capacity as usize {
                continue;
            }
            let event = if i == 0 {
                [0x8000 | tag, 0x4000 | tag]
            } else {
                [0xa000 | (tag & 0xff), 0xc000 | (tag & 0xff)]
            };
            ch.buffer.extend(event);
        }
    }

    fn simulate_map(&self, triggers: i16) -> CalibrateMapResponse {
        let mut response = CalibrateMapResponse::default();
        if self.masked_rocs.contains(&self.roc_addr) {
            return response;
        }

        for col in 0..ROC_NUMCOLS {
            for row in 0..ROC_NUMROWS {
                if !self.pixel_responds(col, row) {
                    continue;
                }
                response.readouts.push(triggers);
                response.ph_sums.push(triggers as i32 * (col as i32 + row as i32));
                response.addresses.push((col as u32) << 8 | row as u32);
            }
        }
        response
    }
}

fn supply_key(supply: Supply) -> &'static str {
    match supply {
        Supply::Va => "VA",
        Supply::Vd => "VD",
        Supply::Ia => "IA",
        Supply::Id => "ID",
    }
}

fn supply_key_for(suffix: &str) -> &'static str {
    match suffix {
        "VA" => "VA",
        "VD" => "VD",
        "IA" => "IA",
        _ => "ID",
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        SimulatedDevice::new("DTB_SIMULATED")
    }
}

impl DeviceSession for SimulatedDevice {
    fn send(&mut self, call: &str, args: &[u8]) -> Result<(), DeviceError> {
        self.check_open()?;
        self.queue.push(RecordedCall {
            name: call.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn request(&mut self, call: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        self.flush()?;
        self.execute(call, args)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.check_open()?;
        let queue = std::mem::take(&mut self.queue);
        for call in queue {
            self.execute(&call.name, &call.args)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.open {
            self.flush()?;
            self.open = false;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_calls_wait_for_flush() {
        let mut dev = SimulatedDevice::default();
        dev.send("Pon", &[]).unwrap();
        assert!(!dev.is_powered());
        assert_eq!(dev.queued(), 1);

        dev.flush().unwrap();
        assert!(dev.is_powered());
        assert_eq!(dev.executed_names(), vec!["Pon"]);
    }

    #[test]
    fn request_executes_queue_first() {
        let mut dev = SimulatedDevice::default();
        dev.send("_SetVA", &encode(&1800u16).unwrap()).unwrap();
        dev.send("Pon", &[]).unwrap();
        let payload = dev.request("_GetVA", &[]).unwrap();
        assert_eq!(decode::<u16>(&payload).unwrap(), 1800);
        assert_eq!(dev.executed_names(), vec!["_SetVA", "Pon", "_GetVA"]);
    }

    #[test]
    fn injected_failure_surfaces_on_flush() {
        let mut dev = SimulatedDevice::default();
        dev.fail_on(Some("Pon"));
        dev.send("Pon", &[]).unwrap();
        assert!(matches!(dev.flush(), Err(DeviceError::IoError(_))));
    }

    #[test]
    fn triggers_only_record_on_running_channels() {
        let mut dev = SimulatedDevice::default();
        let open = DaqOpen {
            buffer_size: 1000,
            channel: 0,
        };
        dev.request("Daq_Open", &encode(&open).unwrap()).unwrap();
        dev.send("Pg_Single", &[]).unwrap();
        dev.send("Daq_Start", &[0]).unwrap();
        dev.send("Pg_Single", &[]).unwrap();
        dev.flush().unwrap();
        assert_eq!(dev.channel(0).buffer.len(), 2);
        assert!(dev.channel(1).buffer.is_empty());
    }

    #[test]
    fn closed_device_rejects_calls() {
        let mut dev = SimulatedDevice::default();
        dev.close().unwrap();
        assert!(!dev.is_open());
        assert!(matches!(dev.send("Pon", &[]), Err(DeviceError::Closed)));
        assert!(matches!(dev.request("GetBoardId", &[]), Err(DeviceError::Closed)));
    }
}
