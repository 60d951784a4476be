//! Class-id to display-name mapping for road scenes.
//!
//! Ids follow the COCO ordering used by the YOLO family so a real model can
//! slot in without remapping.

pub const CLASS_PERSON: i32 = 0;
pub const CLASS_BICYCLE: i32 = 1;
pub const CLASS_CAR: i32 = 2;
pub const CLASS_MOTORCYCLE: i32 = 3;
pub const CLASS_BUS: i32 = 5;
pub const CLASS_TRUCK: i32 = 7;
pub const CLASS_TRAFFIC_LIGHT: i32 = 9;
pub const CLASS_STOP_SIGN: i32 = 11;

/// Human-readable name for a class id.
pub fn class_name(class_id: i32) -> &'static str {
    match class_id {
        CLASS_PERSON => "person",
        CLASS_BICYCLE => "bicycle",
        CLASS_CAR => "car",
        CLASS_MOTORCYCLE => "motorcycle",
        CLASS_BUS => "bus",
        CLASS_TRUCK => "truck",
        CLASS_TRAFFIC_LIGHT => "traffic light",
        CLASS_STOP_SIGN => "stop sign",
        _ => "object",
    }
}
