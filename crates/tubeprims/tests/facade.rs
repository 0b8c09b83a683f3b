#![cfg(unix)]

use std::time::Duration;

use tubeprims::records::{recv_records, send_records};
use tubeprims::transport::readiness::wait_readable;
use tubeprims::transport::{Tube, TubeState};

#[test]
fn facade_exposes_tube_and_batching() {
    let tube = Tube::new();
    assert_eq!(tube.state(), TubeState::Paired);

    let records = [7u8; 24];
    assert_eq!(send_records(&tube, &records, 3, 8).unwrap(), 3);

    let fd = tube.receive_fd().expect("paired tube has a receive fd");
    assert!(wait_readable(fd, Some(Duration::from_secs(1))).unwrap());

    let mut buf = [0u8; 24];
    assert_eq!(recv_records(&tube, &mut buf, 3, 8).unwrap(), 3);
    assert_eq!(buf, records);
}
