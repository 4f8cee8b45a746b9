//! Model-source collaborator.
//!
//! Full SCL/ICD parsing lives outside the simulator core; this module
//! implements its contract: derive a station name from a model-source
//! identifier and produce the initial data points with the metadata needed
//! to classify controls.

use std::path::Path;

use crate::types::{
    ControlModel, DataPoint, DataValue, META_CTL_MODEL, META_DA_NAME, META_DO_NAME, META_LN_CLASS,
};

/// Derive a station name from a model-source path.
///
/// `models/model_cswi.icd` becomes `IED_CSWI`; sources already carrying an
/// `IED_` prefix keep it.
pub fn station_from_model_source(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source);
    let stem = stem.strip_prefix("model_").unwrap_or(stem);
    let upper = stem.to_ascii_uppercase();
    if upper.starts_with("IED_") {
        upper
    } else {
        format!("IED_{upper}")
    }
}

/// Initial data points for a station.
///
/// Every station gets the phase-current measurements and a name plate;
/// switch-controller and breaker stations additionally get their position
/// control. CSWI positions are direct-operate, XCBR positions require
/// select-before-operate.
pub fn seed_points(station: &str) -> Vec<DataPoint> {
    let mut points = vec![
        DataPoint::new(
            format!("{station}/MMXU1.Amp.phsA$MX"),
            format!("Phase A current - {station}"),
            DataValue::Float(0.0),
        ),
        DataPoint::new(
            format!("{station}/MMXU1.Amp.phsB$MX"),
            format!("Phase B current - {station}"),
            DataValue::Float(0.0),
        ),
        DataPoint::new(
            format!("{station}/LLN0.NamPlt$DC"),
            format!("Name plate - {station}"),
            DataValue::Text(format!("Simulator {station}")),
        ),
    ];

    if station.contains("CSWI") {
        points.push(position_point(station, "CSWI", ControlModel::DirectNormal));
    }
    if station.contains("XCBR") {
        points.push(position_point(station, "XCBR", ControlModel::SboNormal));
    }

    points
}

fn position_point(station: &str, ln_class: &str, model: ControlModel) -> DataPoint {
    DataPoint::new(
        format!("{station}/{ln_class}1.Pos$ST"),
        format!("Switch position - {station}"),
        DataValue::Integer(0),
    )
    .with_metadata(META_LN_CLASS, ln_class)
    .with_metadata(META_CTL_MODEL, model.as_str())
    .with_metadata(META_DO_NAME, "Pos")
    .with_metadata(META_DA_NAME, "stVal")
}
