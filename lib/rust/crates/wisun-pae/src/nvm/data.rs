// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Codecs of the four PAE records. Every field is big-endian and fixed-size.

use {
    super::{
        cursor::{Reader, Result, Writer},
        NvmRecord, FRAME_COUNTER_TAG, KEYS_TAG, KEY_STORAGE_INDEX_TAG, NW_INFO_TAG,
    },
    crate::{
        error::PersistenceError, key::gtk::GtkStatus, key::pairwise::PairwiseKeys, Eui64,
        GTK_LEN, GTK_NUM, NETWORK_NAME_MAX_LEN, PMK_LEN, PTK_LEN,
    },
};

pub const NW_INFO_LEN: u16 = 160;
pub const KEYS_LEN: u16 = 107;
pub const FRAME_COUNTER_LEN: u16 = 114;
pub const KEY_STORAGE_INDEX_LEN: u16 = 8;

/// Network name field including the NUL terminator.
const NETWORK_NAME_FIELD_LEN: usize = NETWORK_NAME_MAX_LEN + 1;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NwInfoSlot {
    pub set: bool,
    /// Absolute expiry time in seconds.
    pub expiry: u64,
    pub status: GtkStatus,
    pub install_order: u8,
    pub key: [u8; GTK_LEN],
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NwInfoRecord {
    pub pan_id: u16,
    pub network_name: String,
    pub owner: Eui64,
    pub time_changed: bool,
    pub reference_time: u64,
    pub slots: [NwInfoSlot; GTK_NUM],
}

fn put_network_name(w: &mut Writer<'_>, name: &str) {
    let mut field = [0u8; NETWORK_NAME_FIELD_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NETWORK_NAME_MAX_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    w.put_slice(&field[..]);
}

fn read_network_name(r: &mut Reader<'_>) -> Result<String> {
    let field = r.take(NETWORK_NAME_FIELD_LEN)?;
    let end = field
        .iter()
        .position(|b| *b == 0)
        .ok_or(PersistenceError::InvalidValue("network_name"))?;
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| PersistenceError::InvalidValue("network_name"))
}

impl NvmRecord for NwInfoRecord {
    const TAG: u16 = NW_INFO_TAG;
    const LEN: u16 = NW_INFO_LEN;

    fn encode(&self, w: &mut Writer<'_>) {
        w.put_u16(self.pan_id);
        put_network_name(w, &self.network_name);
        w.put_eui64(&self.owner);
        w.put_bool(self.time_changed);
        w.put_u64(self.reference_time);
        for slot in &self.slots {
            w.put_bool(slot.set);
            w.put_u64(slot.expiry);
            w.put_u8(slot.status as u8);
            w.put_u8(slot.install_order);
            w.put_slice(&slot.key[..]);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let pan_id = r.read_u16()?;
        let network_name = read_network_name(r)?;
        let owner = r.read_eui64()?;
        let time_changed = r.read_bool("time_changed")?;
        let reference_time = r.read_u64()?;
        let mut slots: [NwInfoSlot; GTK_NUM] = Default::default();
        for slot in slots.iter_mut() {
            slot.set = r.read_bool("gtk_set")?;
            slot.expiry = r.read_u64()?;
            slot.status =
                GtkStatus::from_u8(r.read_u8()?).ok_or(PersistenceError::InvalidValue("status"))?;
            slot.install_order = r.read_u8()?;
            if slot.install_order as usize >= GTK_NUM {
                return Err(PersistenceError::InvalidValue("install_order"));
            }
            slot.key = r.read_array()?;
        }
        Ok(NwInfoRecord { pan_id, network_name, owner, time_changed, reference_time, slots })
    }
}

/// Pairwise keys of the supplicant, or of one node on the authenticator.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct KeysRecord {
    pub peer: Option<Eui64>,
    pub pmk: Option<([u8; PMK_LEN], u32)>,
    pub pmk_replay_counter: u64,
    pub ptk: Option<([u8; PTK_LEN], u32)>,
}

impl KeysRecord {
    pub fn from_keys(keys: &PairwiseKeys) -> Self {
        KeysRecord {
            peer: keys.peer(),
            pmk: keys.pmk().map(|pmk| (*pmk, keys.pmk_lifetime())),
            pmk_replay_counter: keys.pmk_replay_counter(),
            ptk: keys.ptk().map(|ptk| (*ptk, keys.ptk_lifetime())),
        }
    }

    pub fn to_keys(&self) -> PairwiseKeys {
        let mut keys = PairwiseKeys::new();
        if let Some(peer) = self.peer {
            keys.set_peer(peer);
        }
        if let Some((pmk, lifetime)) = &self.pmk {
            keys.pmk_set(pmk, *lifetime);
            keys.pmk_replay_counter_set(self.pmk_replay_counter);
        }
        if let Some((ptk, lifetime)) = &self.ptk {
            keys.ptk_set(ptk, *lifetime);
        }
        keys.clear_updated();
        keys
    }
}

impl NvmRecord for KeysRecord {
    const TAG: u16 = KEYS_TAG;
    const LEN: u16 = KEYS_LEN;

    fn encode(&self, w: &mut Writer<'_>) {
        w.put_bool(self.peer.is_some());
        w.put_eui64(&self.peer.unwrap_or_default());
        match &self.pmk {
            Some((pmk, lifetime)) => {
                w.put_bool(true);
                w.put_u32(*lifetime);
                w.put_slice(&pmk[..]);
            }
            None => {
                w.put_bool(false);
                w.put_u32(0);
                w.put_slice(&[0u8; PMK_LEN]);
            }
        }
        w.put_u64(self.pmk_replay_counter);
        match &self.ptk {
            Some((ptk, lifetime)) => {
                w.put_bool(true);
                w.put_u32(*lifetime);
                w.put_slice(&ptk[..]);
            }
            None => {
                w.put_bool(false);
                w.put_u32(0);
                w.put_slice(&[0u8; PTK_LEN]);
            }
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let peer_set = r.read_bool("eui64_set")?;
        let peer = r.read_eui64()?;
        let pmk_set = r.read_bool("pmk_set")?;
        let pmk_lifetime = r.read_u32()?;
        let pmk: [u8; PMK_LEN] = r.read_array()?;
        let pmk_replay_counter = r.read_u64()?;
        let ptk_set = r.read_bool("ptk_set")?;
        let ptk_lifetime = r.read_u32()?;
        let ptk: [u8; PTK_LEN] = r.read_array()?;
        Ok(KeysRecord {
            peer: if peer_set { Some(peer) } else { None },
            pmk: if pmk_set { Some((pmk, pmk_lifetime)) } else { None },
            pmk_replay_counter,
            ptk: if ptk_set { Some((ptk, ptk_lifetime)) } else { None },
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameCounterEntry {
    pub set: bool,
    pub gtk: [u8; GTK_LEN],
    pub counter: u32,
    pub max_jump: u32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameCounterRecord {
    pub restart_count: u32,
    pub reference_time: u64,
    pub pan_version: u16,
    pub entries: [FrameCounterEntry; GTK_NUM],
}

impl NvmRecord for FrameCounterRecord {
    const TAG: u16 = FRAME_COUNTER_TAG;
    const LEN: u16 = FRAME_COUNTER_LEN;

    fn encode(&self, w: &mut Writer<'_>) {
        w.put_u32(self.restart_count);
        w.put_u64(self.reference_time);
        w.put_u16(self.pan_version);
        for entry in &self.entries {
            w.put_bool(entry.set);
            w.put_slice(&entry.gtk[..]);
            w.put_u32(entry.counter);
            w.put_u32(entry.max_jump);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let restart_count = r.read_u32()?;
        let reference_time = r.read_u64()?;
        let pan_version = r.read_u16()?;
        let mut entries: [FrameCounterEntry; GTK_NUM] = Default::default();
        for entry in entries.iter_mut() {
            entry.set = r.read_bool("frame_counter_set")?;
            entry.gtk = r.read_array()?;
            entry.counter = r.read_u32()?;
            entry.max_jump = r.read_u32()?;
        }
        Ok(FrameCounterRecord { restart_count, reference_time, pan_version, entries })
    }
}

/// Bit `n` set means `pae_key_storage_<n>` holds the keys of a node.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct KeyStorageIndexRecord {
    pub bitfield: u64,
}

impl NvmRecord for KeyStorageIndexRecord {
    const TAG: u16 = KEY_STORAGE_INDEX_TAG;
    const LEN: u16 = KEY_STORAGE_INDEX_LEN;

    fn encode(&self, w: &mut Writer<'_>) {
        w.put_u64(self.bitfield);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(KeyStorageIndexRecord { bitfield: r.read_u64()? })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::nvm::{NvmStore, FRAME_COUNTER_FILE_NAME, NW_INFO_FILE_NAME},
        crate::test_utils::MemFileService,
        assert_matches::assert_matches,
    };

    fn encoded_len<R: NvmRecord>(record: &R) -> usize {
        let mut buf = vec![];
        record.encode(&mut Writer::new(&mut buf));
        buf.len()
    }

    fn decode<R: NvmRecord>(buf: &[u8]) -> Result<R> {
        let mut rdr = Reader::new(buf);
        let record = R::decode(&mut rdr)?;
        rdr.finish()?;
        Ok(record)
    }

    fn nw_info() -> NwInfoRecord {
        let mut record = NwInfoRecord {
            pan_id: 0xABCD,
            network_name: "net".to_string(),
            owner: Eui64([1, 2, 3, 4, 5, 6, 7, 8]),
            time_changed: false,
            reference_time: 1_600_000_000,
            ..Default::default()
        };
        record.slots[1] = NwInfoSlot {
            set: true,
            expiry: 1_600_086_400,
            status: GtkStatus::Active,
            install_order: 0,
            key: [0x11; GTK_LEN],
        };
        record
    }

    #[test]
    fn records_have_fixed_lengths() {
        assert_eq!(encoded_len(&nw_info()), NW_INFO_LEN as usize);
        assert_eq!(encoded_len(&KeysRecord::default()), KEYS_LEN as usize);
        assert_eq!(encoded_len(&FrameCounterRecord::default()), FRAME_COUNTER_LEN as usize);
        assert_eq!(encoded_len(&KeyStorageIndexRecord::default()), KEY_STORAGE_INDEX_LEN as usize);
    }

    #[test]
    fn nw_info_layout() {
        let mut buf = vec![];
        nw_info().encode(&mut Writer::new(&mut buf));
        assert_eq!(&buf[0..2], &[0xAB, 0xCD]);
        assert_eq!(&buf[2..5], b"net");
        assert!(buf[5..35].iter().all(|b| *b == 0));
        assert_eq!(&buf[35..43], &[1, 2, 3, 4, 5, 6, 7, 8]);
        // Second slot starts after the 52 byte header and one 27 byte slot.
        assert_eq!(buf[52 + 27], 1);
        assert_eq!(buf[52 + 27 + 9], GtkStatus::Active as u8);
        assert_eq!(decode::<NwInfoRecord>(&buf[..]).expect("error decoding"), nw_info());
    }

    #[test]
    fn nw_info_rejects_bad_fields() {
        let mut buf = vec![];
        nw_info().encode(&mut Writer::new(&mut buf));

        let mut bad_status = buf.clone();
        bad_status[52 + 27 + 9] = 7;
        assert_matches!(
            decode::<NwInfoRecord>(&bad_status[..]),
            Err(PersistenceError::InvalidValue("status"))
        );

        let mut unterminated = buf.clone();
        for b in unterminated[2..35].iter_mut() {
            *b = b'a';
        }
        assert_matches!(
            decode::<NwInfoRecord>(&unterminated[..]),
            Err(PersistenceError::InvalidValue("network_name"))
        );

        assert_matches!(
            decode::<NwInfoRecord>(&buf[..100]),
            Err(PersistenceError::Truncated { .. })
        );
    }

    #[test]
    fn keys_record_carries_pairwise_keys() {
        let mut keys = PairwiseKeys::new();
        keys.set_peer(Eui64([0xA0; 8]));
        keys.pmk_set(&[1; PMK_LEN], 1000);
        keys.pmk_replay_counter_set(42);
        keys.ptk_set(&[2; PTK_LEN], 500);

        let record = KeysRecord::from_keys(&keys);
        let mut buf = vec![];
        record.encode(&mut Writer::new(&mut buf));
        assert_eq!(buf[0], 1);
        let decoded: KeysRecord = decode(&buf[..]).expect("error decoding");
        let restored = decoded.to_keys();
        assert!(restored.is_complete_for(Eui64([0xA0; 8])));
        assert_eq!(restored.pmk_replay_counter(), 42);
        assert_eq!(restored.ptk_lifetime(), 500);
        assert!(!restored.is_updated());
    }

    #[test]
    fn frame_counters_survive_store() {
        let files = MemFileService::new();
        let mut store = NvmStore::new("root", Box::new(files.clone()));
        let mut record = FrameCounterRecord {
            restart_count: 3,
            reference_time: 99,
            pan_version: 7,
            ..Default::default()
        };
        record.entries[2] =
            FrameCounterEntry { set: true, gtk: [0x33; GTK_LEN], counter: 5000, max_jump: 12 };
        store.store(FRAME_COUNTER_FILE_NAME, &record).expect("error storing");
        assert_eq!(store.load::<FrameCounterRecord>(FRAME_COUNTER_FILE_NAME).unwrap(), record);

        // A frame counter file is not network info.
        assert_matches!(
            store.load::<NwInfoRecord>(FRAME_COUNTER_FILE_NAME),
            Err(PersistenceError::TagMismatch { expected: NW_INFO_TAG, found: FRAME_COUNTER_TAG })
        );
        assert_matches!(store.load::<NwInfoRecord>(NW_INFO_FILE_NAME), Err(PersistenceError::Io { .. }));
    }
}
