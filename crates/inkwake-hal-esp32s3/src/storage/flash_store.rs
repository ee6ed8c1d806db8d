use alloc::string::String;

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use inkwake_core::{
    config::{
        KEY_AES_KEY_HEX, KEY_API_RETRY, KEY_IMAGES_BASE, KEY_MANIFEST_URL, KEY_SLEEP_DURATION,
        KEY_WIFI_PASSWORD, KEY_WIFI_RETRY, KEY_WIFI_SSID,
    },
    counters::KeyValueStore,
};
use log::{info, warn};

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

const RECORD_MAGIC: u32 = 0x3156_4B49; // "IKV1"
const RECORD_VERSION: u8 = 1;
const RECORD_LEN: usize = 592;
const CHECKSUM_AT: usize = RECORD_LEN - 4;
const FLAGS_AT: usize = 6;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashStoreError {
    PartitionTable,
    StorePartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Corrupted,
    Unsupported,
    /// Read or write before a successful `open`.
    NotOpen,
    UnknownKey,
    ValueTooLong,
    WrongType,
}

#[derive(Clone, Copy)]
enum SlotKind {
    Number,
    /// Length byte followed by up to `capacity` bytes of UTF-8.
    Text { capacity: usize },
}

#[derive(Clone, Copy)]
struct Slot {
    key: &'static str,
    offset: usize,
    kind: SlotKind,
}

const SLOTS: [Slot; 8] = [
    Slot {
        key: KEY_WIFI_RETRY,
        offset: 8,
        kind: SlotKind::Number,
    },
    Slot {
        key: KEY_API_RETRY,
        offset: 12,
        kind: SlotKind::Number,
    },
    Slot {
        key: KEY_SLEEP_DURATION,
        offset: 16,
        kind: SlotKind::Number,
    },
    Slot {
        key: KEY_MANIFEST_URL,
        offset: 20,
        kind: SlotKind::Text { capacity: 200 },
    },
    Slot {
        key: KEY_IMAGES_BASE,
        offset: 221,
        kind: SlotKind::Text { capacity: 200 },
    },
    Slot {
        key: KEY_AES_KEY_HEX,
        offset: 422,
        kind: SlotKind::Text { capacity: 64 },
    },
    Slot {
        key: KEY_WIFI_SSID,
        offset: 487,
        kind: SlotKind::Text { capacity: 32 },
    },
    Slot {
        key: KEY_WIFI_PASSWORD,
        offset: 520,
        kind: SlotKind::Text { capacity: 64 },
    },
];

fn slot(key: &str) -> Result<(usize, Slot), FlashStoreError> {
    SLOTS
        .iter()
        .enumerate()
        .find(|(_, slot)| slot.key == key)
        .map(|(index, slot)| (index, *slot))
        .ok_or(FlashStoreError::UnknownKey)
}

#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashStoreError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashStoreError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashStoreError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashStoreError::Unsupported);
        }

        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashStoreError::FlashOpFailed(rc));
        }
        Ok(())
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, FlashStoreError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashStoreError::Unsupported);
        }

        let mut word = 0u32;
        let rc = unsafe { esp_rom_spiflash_read(addr, &mut word as *mut u32 as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashStoreError::FlashOpFailed(rc));
        }
        Ok(word)
    }

    fn write_word(&mut self, addr: u32, word: u32) -> Result<(), FlashStoreError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashStoreError::Unsupported);
        }

        let rc = unsafe { esp_rom_spiflash_write(addr, &word as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashStoreError::FlashOpFailed(rc));
        }
        Ok(())
    }

    /// Word-aligned reads only; the record and partition table are both 4-byte aligned.
    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashStoreError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashStoreError::Unsupported);
        }

        for (index, chunk) in out.chunks_mut(4).enumerate() {
            let word = self.read_word(addr + (index as u32) * 4)?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }

    /// Programs `data` into an erased region, padding the last word with 0xFF.
    fn write_erased_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashStoreError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashStoreError::Unsupported);
        }

        for (index, chunk) in data.chunks(4).enumerate() {
            let mut word = [0xFFu8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.write_word(addr + (index as u32) * 4, u32::from_le_bytes(word))?;
        }
        Ok(())
    }
}

impl ReadStorage for RawFlash {
    type Error = FlashStoreError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashStoreError::Unsupported)
    }
}

/// Last sector of the first writable data partition (undefined subtype preferred, NVS fallback).
fn locate_store_sector(flash: &mut RawFlash) -> Result<u32, FlashStoreError> {
    let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
    let table = read_partition_table(flash, &mut table_buf)
        .map_err(|_| FlashStoreError::PartitionTable)?;

    let mut best_data_undefined: Option<(u32, u32)> = None;
    let mut fallback_nvs: Option<(u32, u32)> = None;

    for entry in table.iter() {
        if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
            continue;
        }

        match entry.partition_type() {
            PartitionType::Data(DataPartitionSubType::Undefined) => {
                best_data_undefined = Some((entry.offset(), entry.len()));
                break;
            }
            PartitionType::Data(DataPartitionSubType::Nvs) => {
                if fallback_nvs.is_none() {
                    fallback_nvs = Some((entry.offset(), entry.len()));
                }
            }
            _ => {}
        }
    }

    let (offset, len) = best_data_undefined
        .or(fallback_nvs)
        .ok_or(FlashStoreError::StorePartitionMissing)?;

    if len < FLASH_SECTOR_SIZE {
        return Err(FlashStoreError::PartitionTooSmall);
    }

    Ok(offset + len - FLASH_SECTOR_SIZE)
}

/// In-RAM image of the flash record.
struct Record {
    bytes: [u8; RECORD_LEN],
}

impl Record {
    fn blank() -> Self {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        bytes[4] = RECORD_VERSION;
        Self { bytes }
    }

    /// `Ok(None)` for an erased sector or a foreign record.
    fn decode(bytes: [u8; RECORD_LEN]) -> Result<Option<Self>, FlashStoreError> {
        if bytes.iter().all(|b| *b == 0xFF) {
            return Ok(None);
        }
        if read_u32(&bytes, 0) != RECORD_MAGIC || bytes[4] != RECORD_VERSION {
            return Ok(None);
        }
        if checksum32(&bytes[..CHECKSUM_AT]) != read_u32(&bytes, CHECKSUM_AT) {
            return Err(FlashStoreError::Corrupted);
        }
        Ok(Some(Self { bytes }))
    }

    fn encode(&self) -> [u8; RECORD_LEN] {
        let mut bytes = self.bytes;
        let checksum = checksum32(&bytes[..CHECKSUM_AT]);
        bytes[CHECKSUM_AT..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn flags(&self) -> u16 {
        u16::from_le_bytes([self.bytes[FLAGS_AT], self.bytes[FLAGS_AT + 1]])
    }

    fn set_flags(&mut self, flags: u16) {
        self.bytes[FLAGS_AT..FLAGS_AT + 2].copy_from_slice(&flags.to_le_bytes());
    }

    fn is_present(&self, index: usize) -> bool {
        self.flags() & (1 << index) != 0
    }

    fn clear(&mut self, index: usize) {
        self.set_flags(self.flags() & !(1 << index));
    }

    fn number(&self, slot: &Slot) -> u32 {
        read_u32(&self.bytes, slot.offset)
    }

    fn set_number(&mut self, index: usize, slot: &Slot, value: u32) {
        self.bytes[slot.offset..slot.offset + 4].copy_from_slice(&value.to_le_bytes());
        self.set_flags(self.flags() | (1 << index));
    }

    fn text(&self, slot: &Slot, capacity: usize) -> Result<&str, FlashStoreError> {
        let len = self.bytes[slot.offset] as usize;
        if len > capacity {
            return Err(FlashStoreError::Corrupted);
        }
        let start = slot.offset + 1;
        core::str::from_utf8(&self.bytes[start..start + len])
            .map_err(|_| FlashStoreError::Corrupted)
    }

    fn set_text(&mut self, index: usize, slot: &Slot, capacity: usize, value: &str) {
        let start = slot.offset + 1;
        self.bytes[start..start + capacity].fill(0);
        self.bytes[start..start + value.len()].copy_from_slice(value.as_bytes());
        self.bytes[slot.offset] = value.len() as u8;
        self.set_flags(self.flags() | (1 << index));
    }
}

/// Key/value store kept as a single checksummed record in the last sector of a data partition.
///
/// Reads are served from RAM; each changing write rewrites the sector.
pub struct FlashStore {
    flash: Option<(RawFlash, u32)>,
    record: Option<Record>,
}

impl Default for FlashStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashStore {
    pub const fn new() -> Self {
        Self {
            flash: None,
            record: None,
        }
    }

    fn sector(&mut self) -> Result<(&mut RawFlash, u32), FlashStoreError> {
        if self.flash.is_none() {
            let mut flash = RawFlash::new()?;
            let sector_addr = locate_store_sector(&mut flash)?;
            info!("store: sector addr=0x{:x}", sector_addr);
            self.flash = Some((flash, sector_addr));
        }

        match self.flash.as_mut() {
            Some((flash, sector_addr)) => Ok((flash, *sector_addr)),
            None => Err(FlashStoreError::StorePartitionMissing),
        }
    }

    fn record(&self) -> Result<&Record, FlashStoreError> {
        self.record.as_ref().ok_or(FlashStoreError::NotOpen)
    }

    fn update(&mut self, edit: impl FnOnce(&mut Record)) -> Result<(), FlashStoreError> {
        let record = self.record.as_mut().ok_or(FlashStoreError::NotOpen)?;
        let before = record.bytes;
        edit(record);
        if record.bytes == before {
            return Ok(());
        }

        let encoded = record.encode();
        let (flash, sector_addr) = self.sector()?;
        flash.erase_sector(sector_addr)?;
        flash.write_erased_bytes(sector_addr, &encoded)
    }
}

impl KeyValueStore for FlashStore {
    type Error = FlashStoreError;

    fn open(&mut self) -> Result<(), Self::Error> {
        let (flash, sector_addr) = self.sector()?;
        let mut bytes = [0u8; RECORD_LEN];
        flash.read_bytes(sector_addr, &mut bytes)?;

        let record = match Record::decode(bytes) {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("store: no record; starting empty");
                Record::blank()
            }
            Err(err) => {
                warn!("store: record unreadable err={:?}; starting empty", err);
                Record::blank()
            }
        };
        self.record = Some(record);
        Ok(())
    }

    fn get_u32(&mut self, key: &str) -> Result<Option<u32>, Self::Error> {
        let (index, slot) = slot(key)?;
        let SlotKind::Number = slot.kind else {
            return Err(FlashStoreError::WrongType);
        };
        let record = self.record()?;
        Ok(record.is_present(index).then(|| record.number(&slot)))
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), Self::Error> {
        let (index, slot) = slot(key)?;
        let SlotKind::Number = slot.kind else {
            return Err(FlashStoreError::WrongType);
        };
        self.update(|record| record.set_number(index, &slot, value))
    }

    fn get_string(&mut self, key: &str) -> Result<Option<String>, Self::Error> {
        let (index, slot) = slot(key)?;
        let SlotKind::Text { capacity } = slot.kind else {
            return Err(FlashStoreError::WrongType);
        };
        let record = self.record()?;
        if !record.is_present(index) {
            return Ok(None);
        }
        record.text(&slot, capacity).map(|text| Some(String::from(text)))
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        let (index, slot) = slot(key)?;
        let SlotKind::Text { capacity } = slot.kind else {
            return Err(FlashStoreError::WrongType);
        };
        if value.len() > capacity {
            return Err(FlashStoreError::ValueTooLong);
        }
        self.update(|record| record.set_text(index, &slot, capacity, value))
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        let (index, _) = slot(key)?;
        self.update(|record| record.clear(index))
    }

    fn erase_all(&mut self) -> Result<(), Self::Error> {
        let (flash, sector_addr) = self.sector()?;
        flash.erase_sector(sector_addr)?;
        if self.record.is_some() {
            self.record = Some(Record::blank());
        }
        info!("store: erased");
        Ok(())
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
