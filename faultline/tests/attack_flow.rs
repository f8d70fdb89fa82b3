//! End-to-end flow: plant a privilege-check idiom in a simulated victim,
//! locate it by scanning the instruction words, and fault the conditional
//! branch through the device boundary.

use faultline::locate::{SliceSource, scan};
use faultline::provider::{PTE_USER_EXEC, PTE_WRITE};
use faultline::{
    FaultCommand, FaultDevice, Redirection, RedirectionRequest, STATUS_OK, SimProvider, redirect,
};

const PID: u32 = 1337;
const TEXT: u64 = 0x40_0000;

const NOP: u32 = 0xD503_201F;
const BL: u32 = 0x9400_0010;
const CMP: u32 = 0x7100_001F;
const B_NE: u32 = 0x5400_0041;

fn victim_with_check() -> (SimProvider, Vec<u32>) {
    let mut sim = SimProvider::new();
    sim.add_process(PID);
    sim.map_page(PID, TEXT, PTE_USER_EXEC | PTE_WRITE).unwrap();
    let words = vec![NOP, NOP, BL, CMP, B_NE, NOP];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    sim.write_virt(PID, TEXT, &bytes).unwrap();
    (sim, words)
}

#[test]
fn locate_then_fault_the_check_branch() {
    let (sim, words) = victim_with_check();

    let mut source = SliceSource::new(TEXT, &words);
    let end = TEXT + words.len() as u64 * 4;
    let found = scan(&mut source, TEXT, end).unwrap();
    assert_eq!(found.branch_addr, TEXT + 8);
    assert_eq!(found.cond_branch_addr, TEXT + 16);

    let mut device = FaultDevice::start(sim);
    let cmd = FaultCommand {
        vaddr: found.cond_branch_addr,
        pid: PID,
        target_bit: 0,
        frame_offset: 0,
    };
    assert_eq!(device.request(&cmd.to_wire()), STATUS_OK);

    // content mode XORs the word at the frame base, so the fault landed at
    // offset 0 of the page backing the branch
    let mut first = [0u8; 4];
    device.provider().read_virt(PID, TEXT, &mut first).unwrap();
    assert_eq!(u32::from_le_bytes(first), NOP ^ 1);

    // and the same request undoes it
    assert_eq!(device.request(&cmd.to_wire()), STATUS_OK);
    device.provider().read_virt(PID, TEXT, &mut first).unwrap();
    assert_eq!(u32::from_le_bytes(first), NOP);
}

#[test]
fn redirect_composes_with_the_device_provider() {
    let (sim, _) = victim_with_check();
    let mut device = FaultDevice::start(sim);
    let data = TEXT + 0x20_0000;
    device.provider_mut().map_page(PID, data, PTE_WRITE).unwrap();

    let outcome = redirect(
        device.provider_mut(),
        &RedirectionRequest {
            pid: PID,
            source_vaddr: TEXT,
            alias_vaddr: data,
        },
    )
    .unwrap();
    assert!(matches!(outcome, Redirection::Applied { .. }));

    // the text page now reads the data page's (zeroed) frame
    let mut word = [0u8; 4];
    device.provider().read_virt(PID, TEXT, &mut word).unwrap();
    assert_eq!(word, [0u8; 4]);
    assert_eq!(device.provider().flush_log().len(), 1);
}
