const COMMANDS: &[&str] = &[
    "start_write_flow",
    "start_scan_for_new_flow",
    "start_scan_for_import_flow",
    "cancel_tag_flow",
    "tag_status",
    "list_medicines",
    "add_medicine",
    "toggle_medicine_taken",
];

fn main() {
    tauri_plugin::Builder::new(COMMANDS).build();
}
