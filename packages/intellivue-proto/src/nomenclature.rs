//! The Philips nomenclature: a partitioned 16-bit identifier space.
//!
//! The same numeric code can name different things in different
//! partitions (61696 is `NOM_ATTR_NET_ADDR_INFO` in the object partition
//! and `NOM_SAT_O2_VEN_CENT` in SCADA), so display lookups are
//! partition-qualified wherever the partition is known from context. The
//! partition-free [`lookup`] exists for positions where it is not, and
//! documents its preference instead of silently picking a table order.

use crate::wire::WireError;

/// Identifier partitions (PIPG-37).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Partition {
    Object = 1,
    Scada = 2,
    Event = 3,
    Dimension = 4,
    ParameterGroup = 6,
    Infrastructure = 8,
}

impl TryFrom<u16> for Partition {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, WireError> {
        match value {
            1 => Ok(Partition::Object),
            2 => Ok(Partition::Scada),
            3 => Ok(Partition::Event),
            4 => Ok(Partition::Dimension),
            6 => Ok(Partition::ParameterGroup),
            8 => Ok(Partition::Infrastructure),
            v => Err(WireError::UnknownTag { field: "partition", value: v as u32 }),
        }
    }
}

// ── Object partition: managed-object classes, attributes, actions ─────────────

pub const NOM_MOC_VMO_METRIC_NU: u16 = 6;
pub const NOM_MOC_VMO_METRIC_SA_RT: u16 = 9;
pub const NOM_MOC_VMS_MDS: u16 = 33;
pub const NOM_ATTR_GRP_METRIC_VAL_OBS: u16 = 2051;
pub const NOM_ATTR_ID_HANDLE: u16 = 2337;
pub const NOM_ATTR_ID_TYPE: u16 = 2351;
pub const NOM_ATTR_NU_VAL_OBS: u16 = 2384;
pub const NOM_ATTR_SYS_ID: u16 = 2436;
pub const NOM_ATTR_TIME_STAMP_ABS: u16 = 2448;
pub const NOM_ACT_POLL_MDIB_DATA: u16 = 3094;
pub const NOM_DEV_PULS_VMD: u16 = 5138;
pub const NOM_ACT_POLL_MDIB_DATA_EXT: u16 = 61755;
pub const NOM_ATTR_NET_ADDR_INFO: u16 = 61696;

// ── SCADA partition: physiological identifiers ────────────────────────────────

pub const NOM_ECG_CARD_BEAT_RATE: u16 = 16770;
pub const NOM_ECG_V_P_C_CNT: u16 = 16993;
pub const NOM_PULS_RATE: u16 = 18442;
pub const NOM_PLETH_PULS_RATE: u16 = 18466;
pub const NOM_PRESS_BLD_NONINV_SYS: u16 = 18949;
pub const NOM_PRESS_BLD_NONINV_DIA: u16 = 18950;
pub const NOM_PRESS_BLD_NONINV_MEAN: u16 = 18951;
pub const NOM_PULS_OXIM_PERF_REL: u16 = 19376;
pub const NOM_PULS_OXIM_SAT_O2: u16 = 19384;
pub const NOM_RESP_RATE: u16 = 20490;
pub const NOM_SAT_O2_TONE_FREQ: u16 = 61448;
pub const NOM_PRESS_BLD_NONINV_PULS_RATE: u16 = 61669;
pub const NOM_SAT_O2_VEN_CENT: u16 = 61696;

// ── Event partition ───────────────────────────────────────────────────────────

pub const NOM_NOTI_MDS_CREAT: u16 = 3334;
pub const NOM_NOTI_CONN_INDIC: u16 = 3351;

// ── Dimension partition: units of measure ─────────────────────────────────────

pub const NOM_DIM_DIMLESS: u16 = 512;
pub const NOM_DIM_PERCENT: u16 = 544;
pub const NOM_DIM_X_HZ: u16 = 2496;
pub const NOM_DIM_BEAT_PER_MIN: u16 = 2720;
pub const NOM_DIM_RESP_PER_MIN: u16 = 2784;
pub const NOM_DIM_MMHG: u16 = 3872;

// ── Infrastructure partition: association poll profile ────────────────────────

pub const NOM_POLL_PROFILE_SUPPORT: u16 = 1;
pub const NOM_MDIB_OBJ_SUPPORT: u16 = 258;
pub const NOM_ATTR_POLL_PROFILE_EXT: u16 = 61441;

/// One row per known identifier. SCADA rows sit before object rows so
/// that the partition-free [`lookup`] resolves overloaded codes to the
/// physiological name.
const IDENTIFIERS: &[(Partition, u16, &str)] = &[
    (Partition::Scada, NOM_ECG_CARD_BEAT_RATE, "NOM_ECG_CARD_BEAT_RATE"),
    (Partition::Scada, NOM_ECG_V_P_C_CNT, "NOM_ECG_V_P_C_CNT"),
    (Partition::Scada, NOM_PULS_RATE, "NOM_PULS_RATE"),
    (Partition::Scada, NOM_PLETH_PULS_RATE, "NOM_PLETH_PULS_RATE"),
    (Partition::Scada, NOM_PRESS_BLD_NONINV_SYS, "NOM_PRESS_BLD_NONINV_SYS"),
    (Partition::Scada, NOM_PRESS_BLD_NONINV_DIA, "NOM_PRESS_BLD_NONINV_DIA"),
    (Partition::Scada, NOM_PRESS_BLD_NONINV_MEAN, "NOM_PRESS_BLD_NONINV_MEAN"),
    (Partition::Scada, NOM_PULS_OXIM_PERF_REL, "NOM_PULS_OXIM_PERF_REL"),
    (Partition::Scada, NOM_PULS_OXIM_SAT_O2, "NOM_PULS_OXIM_SAT_O2"),
    (Partition::Scada, NOM_RESP_RATE, "NOM_RESP_RATE"),
    (Partition::Scada, NOM_SAT_O2_TONE_FREQ, "NOM_SAT_O2_TONE_FREQ"),
    (Partition::Scada, NOM_PRESS_BLD_NONINV_PULS_RATE, "NOM_PRESS_BLD_NONINV_PULS_RATE"),
    (Partition::Scada, NOM_SAT_O2_VEN_CENT, "NOM_SAT_O2_VEN_CENT"),
    (Partition::Object, NOM_MOC_VMO_METRIC_NU, "NOM_MOC_VMO_METRIC_NU"),
    (Partition::Object, NOM_MOC_VMO_METRIC_SA_RT, "NOM_MOC_VMO_METRIC_SA_RT"),
    (Partition::Object, NOM_MOC_VMS_MDS, "NOM_MOC_VMS_MDS"),
    (Partition::Object, NOM_ATTR_GRP_METRIC_VAL_OBS, "NOM_ATTR_GRP_METRIC_VAL_OBS"),
    (Partition::Object, NOM_ATTR_ID_HANDLE, "NOM_ATTR_ID_HANDLE"),
    (Partition::Object, NOM_ATTR_ID_TYPE, "NOM_ATTR_ID_TYPE"),
    (Partition::Object, NOM_ATTR_NU_VAL_OBS, "NOM_ATTR_NU_VAL_OBS"),
    (Partition::Object, NOM_ATTR_SYS_ID, "NOM_ATTR_SYS_ID"),
    (Partition::Object, NOM_ATTR_TIME_STAMP_ABS, "NOM_ATTR_TIME_STAMP_ABS"),
    (Partition::Object, NOM_ACT_POLL_MDIB_DATA, "NOM_ACT_POLL_MDIB_DATA"),
    (Partition::Object, NOM_ACT_POLL_MDIB_DATA_EXT, "NOM_ACT_POLL_MDIB_DATA_EXT"),
    (Partition::Object, NOM_DEV_PULS_VMD, "NOM_DEV_PULS_VMD"),
    (Partition::Object, NOM_ATTR_NET_ADDR_INFO, "NOM_ATTR_NET_ADDR_INFO"),
    (Partition::Event, NOM_NOTI_MDS_CREAT, "NOM_NOTI_MDS_CREAT"),
    (Partition::Event, NOM_NOTI_CONN_INDIC, "NOM_NOTI_CONN_INDIC"),
    (Partition::Dimension, NOM_DIM_DIMLESS, "NOM_DIM_DIMLESS"),
    (Partition::Dimension, NOM_DIM_PERCENT, "NOM_DIM_PERCENT"),
    (Partition::Dimension, NOM_DIM_X_HZ, "NOM_DIM_X_HZ"),
    (Partition::Dimension, NOM_DIM_BEAT_PER_MIN, "NOM_DIM_BEAT_PER_MIN"),
    (Partition::Dimension, NOM_DIM_RESP_PER_MIN, "NOM_DIM_RESP_PER_MIN"),
    (Partition::Dimension, NOM_DIM_MMHG, "NOM_DIM_MMHG"),
    (Partition::Infrastructure, NOM_POLL_PROFILE_SUPPORT, "NOM_POLL_PROFILE_SUPPORT"),
    (Partition::Infrastructure, NOM_MDIB_OBJ_SUPPORT, "NOM_MDIB_OBJ_SUPPORT"),
    (Partition::Infrastructure, NOM_ATTR_POLL_PROFILE_EXT, "NOM_ATTR_POLL_PROFILE_EXT"),
];

/// Partition-qualified name lookup.
pub fn name(partition: Partition, code: u16) -> Option<&'static str> {
    IDENTIFIERS
        .iter()
        .find(|(p, c, _)| *p == partition && *c == code)
        .map(|(_, _, n)| *n)
}

/// Partition-qualified reverse lookup.
pub fn code(partition: Partition, name: &str) -> Option<u16> {
    IDENTIFIERS
        .iter()
        .find(|(p, _, n)| *p == partition && *n == name)
        .map(|(_, c, _)| *c)
}

/// Partition-free lookup for positions where the partition is
/// unambiguous from context. Prefers the SCADA partition when a code is
/// overloaded.
pub fn lookup(code: u16) -> Option<&'static str> {
    IDENTIFIERS.iter().find(|(_, c, _)| *c == code).map(|(_, _, n)| *n)
}

/// Symbolic name, or the decimal code when unknown. This is the form
/// exposed on the webhook surface.
pub fn display(partition: Partition, code: u16) -> String {
    match name(partition, code) {
        Some(n) => n.to_string(),
        None => code.to_string(),
    }
}

// ── Measurement state (PIPG-76) ───────────────────────────────────────────────

pub const INVALID: u16 = 0x8000;
pub const QUESTIONABLE: u16 = 0x4000;
pub const UNAVAILABLE: u16 = 0x2000;
pub const CALIBRATION_ONGOING: u16 = 0x1000;
pub const TEST_DATA: u16 = 0x0800;
pub const DEMO_DATA: u16 = 0x0400;
pub const VALIDATED_DATA: u16 = 0x0080;
pub const EARLY_INDICATION: u16 = 0x0040;
pub const MSMT_ONGOING: u16 = 0x0020;
pub const MSMT_STATE_IN_ALARM: u16 = 0x0002;
pub const MSMT_STATE_AL_INHIBITED: u16 = 0x0001;

const MEASUREMENT_STATES: &[(u16, &str)] = &[
    (INVALID, "INVALID"),
    (QUESTIONABLE, "QUESTIONABLE"),
    (UNAVAILABLE, "UNAVAILABLE"),
    (CALIBRATION_ONGOING, "CALIBRATION_ONGOING"),
    (TEST_DATA, "TEST_DATA"),
    (DEMO_DATA, "DEMO_DATA"),
    (0x0200, "MEASUREMENT_STATE_UNDEFINED1"),
    (0x0100, "MEASUREMENT_STATE_UNDEFINED2"),
    (VALIDATED_DATA, "VALIDATED_DATA"),
    (EARLY_INDICATION, "EARLY_INDICATION"),
    (MSMT_ONGOING, "MSMT_ONGOING"),
    (0x0010, "MEASUREMENT_STATE_UNDEFINED3"),
    (0x0008, "MEASUREMENT_STATE_UNDEFINED4"),
    (0x0004, "MEASUREMENT_STATE_UNDEFINED5"),
    (MSMT_STATE_IN_ALARM, "MSMT_STATE_IN_ALARM"),
    (MSMT_STATE_AL_INHIBITED, "MSMT_STATE_AL_INHIBITED"),
];

/// Names of the state flags set in `state`, highest bit first.
pub fn measurement_state_names(state: u16) -> Vec<&'static str> {
    MEASUREMENT_STATES
        .iter()
        .filter(|(bit, _)| state & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_qualified_lookup() {
        assert_eq!(name(Partition::Scada, 19384), Some("NOM_PULS_OXIM_SAT_O2"));
        assert_eq!(name(Partition::Dimension, 544), Some("NOM_DIM_PERCENT"));
        assert_eq!(name(Partition::Scada, 544), None);
    }

    #[test]
    fn overloaded_code_resolves_per_partition() {
        assert_eq!(name(Partition::Object, 61696), Some("NOM_ATTR_NET_ADDR_INFO"));
        assert_eq!(name(Partition::Scada, 61696), Some("NOM_SAT_O2_VEN_CENT"));
        // Partition-free fallback prefers SCADA.
        assert_eq!(lookup(61696), Some("NOM_SAT_O2_VEN_CENT"));
    }

    #[test]
    fn name_code_are_inverse() {
        for (p, c, n) in IDENTIFIERS {
            assert_eq!(name(*p, *c), Some(*n));
            assert_eq!(code(*p, n), Some(*c));
        }
    }

    #[test]
    fn display_falls_back_to_decimal() {
        assert_eq!(display(Partition::Scada, 19384), "NOM_PULS_OXIM_SAT_O2");
        assert_eq!(display(Partition::Scada, 12345), "12345");
    }

    #[test]
    fn state_flag_names() {
        assert_eq!(
            measurement_state_names(INVALID | MSMT_ONGOING),
            vec!["INVALID", "MSMT_ONGOING"]
        );
        assert!(measurement_state_names(0).is_empty());
    }

    #[test]
    fn unknown_partition_tag() {
        assert!(Partition::try_from(5).is_err());
        assert_eq!(Partition::try_from(8), Ok(Partition::Infrastructure));
    }
}
