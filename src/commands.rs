//! Command bodies understood by the printer, ready for [`crate::PrinterClient::publish`].
//!
//! Fixed commands are plain string constants. Parameterised ones are built
//! with `serde_json`, so caller strings are escaped instead of spliced in.
//! Every command carries `"sequence_id":"0"`; the printer echoes it back in
//! its reply.

use serde_json::{json, Value};

pub const CHAMBER_LIGHT_ON: &str = r#"{"system":{"sequence_id":"0","command":"ledctrl","led_node":"chamber_light","led_mode":"on","led_on_time":500,"led_off_time":500,"loop_times":0,"interval_time":0}}"#;
pub const CHAMBER_LIGHT_OFF: &str = r#"{"system":{"sequence_id":"0","command":"ledctrl","led_node":"chamber_light","led_mode":"off","led_on_time":500,"led_off_time":500,"loop_times":0,"interval_time":0}}"#;
pub const CHAMBER_LIGHT_2_ON: &str = r#"{"system":{"sequence_id":"0","command":"ledctrl","led_node":"chamber_light2","led_mode":"on","led_on_time":500,"led_off_time":500,"loop_times":0,"interval_time":0}}"#;
pub const CHAMBER_LIGHT_2_OFF: &str = r#"{"system":{"sequence_id":"0","command":"ledctrl","led_node":"chamber_light2","led_mode":"off","led_on_time":500,"led_off_time":500,"loop_times":0,"interval_time":0}}"#;

pub const HEATBED_LIGHT_ON: &str = r#"{"system":{"sequence_id":"0","command":"ledctrl","led_node":"heatbed_light","led_mode":"on","led_on_time":0,"led_off_time":0,"loop_times":0,"interval_time":0}}"#;
pub const HEATBED_LIGHT_OFF: &str = r#"{"system":{"sequence_id":"0","command":"ledctrl","led_node":"heatbed_light","led_mode":"off","led_on_time":0,"led_off_time":0,"loop_times":0,"interval_time":0}}"#;

pub const GET_VERSION: &str = r#"{"info":{"sequence_id":"0","command":"get_version"}}"#;

pub const PAUSE: &str = r#"{"print":{"sequence_id":"0","command":"pause"}}"#;
pub const RESUME: &str = r#"{"print":{"sequence_id":"0","command":"resume"}}"#;
pub const STOP: &str = r#"{"print":{"sequence_id":"0","command":"stop"}}"#;

/// Asks for one full status report.
pub const PUSH_ALL: &str = r#"{"pushing":{"sequence_id":"0","command":"pushall"}}"#;
/// Asks the printer to start streaming delta reports.
pub const START_PUSH: &str = r#"{"pushing":{"sequence_id":"0","command":"start"}}"#;

/// X1 series only.
pub const GET_ACCESSORIES: &str = r#"{"system":{"sequence_id":"0","command":"get_accessories","accessory_type":"none"}}"#;

// A1 and H2D only
pub const PROMPT_SOUND_ENABLE: &str = r#"{"print":{"sequence_id":"0","command":"print_option","sound_enable":true}}"#;
pub const PROMPT_SOUND_DISABLE: &str = r#"{"print":{"sequence_id":"0","command":"print_option","sound_enable":false}}"#;

// H2D only
pub const BUZZER_SET_SILENT: &str = r#"{"print":{"sequence_id":"0","command":"buzzer_ctrl","mode":0,"reason":""}}"#;
pub const BUZZER_SET_ALARM: &str = r#"{"print":{"sequence_id":"0","command":"buzzer_ctrl","mode":1,"reason":""}}"#;
pub const BUZZER_SET_BEEPING: &str = r#"{"print":{"sequence_id":"0","command":"buzzer_ctrl","mode":2,"reason":""}}"#;

pub const HOME_GCODE: &str = "G28\n";

/// Wraps `body` as `{"print": body}` with the sequence id filled in.
fn print_command(command: &str, mut body: Value) -> String {
    if let Value::Object(map) = &mut body {
        map.insert("sequence_id".into(), json!("0"));
        map.insert("command".into(), json!(command));
    }
    json!({ "print": body }).to_string()
}

/// `param` is the profile level as the printer names it, e.g. `"2"` for standard.
pub fn speed_profile(param: &str) -> String {
    print_command("print_speed", json!({ "param": param }))
}

/// Runs raw G-code; separate lines with `\n`.
pub fn send_gcode(gcode: &str) -> String {
    print_command("gcode_line", json!({ "param": gcode }))
}

/// Loads the filament in `target` (255 unloads).
pub fn switch_ams(target: u32, curr_temp: u32, tar_temp: u32) -> String {
    print_command(
        "ams_change_filament",
        json!({ "target": target, "curr_temp": curr_temp, "tar_temp": tar_temp }),
    )
}

/// Filament profile of one AMS tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilamentSetting {
    pub ams_id: u32,
    pub tray_id: u32,
    /// Setting id of the filament profile, e.g. `GFA00`.
    pub tray_info_idx: String,
    /// `RRGGBBAA`; alpha is always `FF`.
    pub tray_color: String,
    pub nozzle_temp_min: u32,
    pub nozzle_temp_max: u32,
    /// `PLA`, `ABS`, ...
    pub tray_type: String,
}

impl Default for FilamentSetting {
    fn default() -> Self {
        Self {
            ams_id: 0,
            tray_id: 0,
            tray_info_idx: String::new(),
            tray_color: "000000FF".to_string(),
            nozzle_temp_min: 0,
            nozzle_temp_max: 0,
            tray_type: "PLA".to_string(),
        }
    }
}

pub fn ams_filament_setting(setting: &FilamentSetting) -> String {
    print_command(
        "ams_filament_setting",
        json!({
            "ams_id": setting.ams_id,
            "tray_id": setting.tray_id,
            "tray_info_idx": setting.tray_info_idx,
            "tray_color": setting.tray_color,
            "nozzle_temp_min": setting.nozzle_temp_min,
            "nozzle_temp_max": setting.nozzle_temp_max,
            "tray_type": setting.tray_type,
        }),
    )
}

/// Relative move of one axis in whole millimetres, wrapped so soft limits
/// are restored afterwards. Feed it to [`send_gcode`].
pub fn move_axis_gcode(axis: char, distance: i32, speed: u32) -> String {
    format!(
        "M211 S\nM211 X1 Y1 Z1\nM1002 push_ref_mode\nG91 \nG1 {}{}.0 F{}\nM1002 pop_ref_mode\nM211 R\n",
        axis.to_ascii_uppercase(),
        distance,
        speed
    )
}

/// Extrudes (positive) or retracts (negative) `distance` mm at F900.
pub fn extruder_gcode(distance: i32) -> String {
    format!("M83 \nG0 E{}.0 F900\n", distance)
}
