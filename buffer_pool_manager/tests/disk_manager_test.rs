use common::api::PAGE_SIZE;
use common::disk_manager::DiskManager;

#[test]
fn allocate_page_hands_out_increasing_ids() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let disk_manager = DiskManager::new(file.path()).unwrap();
    let first = disk_manager.allocate_page();
    let second = disk_manager.allocate_page();
    assert!(second > first);
    assert_ne!(first, common::api::INVALID_PAGE_ID);
}

#[test]
fn write_then_read_round_trips_bytes() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let disk_manager = DiskManager::new(file.path()).unwrap();
    let page_id = disk_manager.allocate_page();

    let mut data = [0u8; PAGE_SIZE];
    for (i, b) in data.iter_mut().enumerate() {
        *b = i as u8;
    }
    disk_manager.write_page(page_id, &data).unwrap();

    let mut read_back = [0u8; PAGE_SIZE];
    disk_manager.read_page(page_id, &mut read_back).unwrap();
    assert_eq!(data, read_back);
}
