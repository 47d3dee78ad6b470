use fakeservice::FakeMemory;
use glam::Vec3;
use xrcore::{
    ClickDetector, HandSide, HandTracker, HandTrackingStream, JointName, Layout, LockHandle,
    PressState, Settings, SharedMemory, StrictType, Type,
};

struct Service(FakeMemory);

impl SharedMemory for Service {
    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    fn read_lock(&self) -> Option<LockHandle> {
        self.0.read_lock().map(LockHandle)
    }

    fn unlock(&self, handle: LockHandle) -> bool {
        self.0.unlock(handle.0)
    }

    fn size(&self, handle: &LockHandle) -> usize {
        self.0.size(handle.0)
    }

    fn read(&self, handle: &LockHandle, offset: usize, dst: &mut [u8]) -> bool {
        self.0.read(handle.0, offset, dst)
    }
}

/// Joints of an upright right hand in the service's camera space: millimeters with Y pointing
/// down.
fn camera_hand(open: bool) -> Vec<Vec3> {
    use JointName::*;

    let finger_y = |base: f32, step: f32| {
        if open {
            [base, base + step, base + 2.0 * step]
        } else {
            [30.0, 15.0, 5.0]
        }
    };
    let fingers = [
        (-30.0, [IPIP, IDIP, ITIP], finger_y(30.0, 20.0)),
        (0.0, [MPIP, MDIP, MTIP], finger_y(35.0, 22.0)),
        (15.0, [RPIP, RDIP, RTIP], finger_y(30.0, 18.0)),
        (30.0, [PPIP, PDIP, PTIP], finger_y(25.0, 15.0)),
    ];

    let mut joints = [Vec3::ZERO; 21];
    let mut set = |joint: JointName, x: f32, y: f32| {
        joints[joint.index()] = Vec3::new(x, -y, 400.0);
    };
    set(Wrist, 0.0, -100.0);
    set(TMCP, -40.0, -70.0);
    set(IMCP, -30.0, 0.0);
    set(MMCP, 0.0, 0.0);
    set(RMCP, 15.0, 0.0);
    set(PMCP, 30.0, 0.0);
    set(TPIP, -60.0, -50.0);
    set(TDIP, -75.0, -30.0);
    if open {
        set(TTIP, -90.0, -10.0);
    } else {
        set(TTIP, -50.0, -30.0);
    }
    for (x, chain, ys) in fingers {
        for (joint, y) in chain.into_iter().zip(ys) {
            set(joint, x, y);
        }
    }
    joints.to_vec()
}

fn publish(service: &Service, layout: &Layout, timestamp: f64, right: Option<&[Vec3]>) {
    let offset = |name: &str| layout.field(name).unwrap().offset;
    service.0.write_f64(offset("timestamp"), timestamp);
    match right {
        Some(joints) => {
            service.0.write_i32s(offset("right_state"), &[2]);
            service.0.write_vec3s(offset("right_joints"), joints);
        }
        None => service.0.write_i32s(offset("right_state"), &[0]),
    }
}

fn setup() -> (Service, Layout, HandTrackingStream) {
    xrcore::init_logging();
    let layout = Settings::default().layout("hand_tracking").unwrap();
    let service = Service(FakeMemory::new(layout.extent()));
    let stream = HandTrackingStream::new(layout.clone());
    (service, layout, stream)
}

#[test]
fn gestures_from_published_joints() {
    let (service, layout, mut stream) = setup();
    let mut tracker = HandTracker::new(HandSide::Right);

    publish(&service, &layout, 1.0, Some(&camera_hand(true)));
    let frame = stream.poll(&service).unwrap().unwrap();
    tracker.on_new_sample(&frame.right);
    assert!(tracker.found());
    assert_eq!(tracker.gesture().strict_type(), StrictType::Five);
    assert_eq!(tracker.gesture().loose_type(), Type::Five);

    publish(&service, &layout, 2.0, Some(&camera_hand(false)));
    let frame = stream.poll(&service).unwrap().unwrap();
    tracker.on_new_sample(&frame.right);
    assert_eq!(tracker.gesture().strict_type(), StrictType::Fist);
    assert!(tracker.keeping(Type::Five));

    let classified = xrcore::classify_joints(HandSide::Right, &frame.right.joints);
    assert_eq!(classified, tracker.gesture());
    assert_eq!(service.0.outstanding_locks(), 0);
}

#[test]
fn fist_clicks() {
    let (service, layout, mut stream) = setup();
    let mut tracker = HandTracker::new(HandSide::Right);
    let mut click = ClickDetector::new(Type::Fist);

    let mut presses = Vec::new();
    let samples = [
        Some(camera_hand(true)),
        Some(camera_hand(false)),
        Some(camera_hand(false)),
        Some(camera_hand(true)),
        None,
    ];
    for (i, joints) in samples.iter().enumerate() {
        publish(&service, &layout, i as f64, joints.as_deref());
        let frame = stream.poll(&service).unwrap().unwrap();
        tracker.on_new_sample(&frame.right);
        presses.push(click.update(&tracker.gesture()));
    }

    assert_eq!(
        presses,
        [
            PressState::NotChanged,
            PressState::Pressed,
            PressState::NotChanged,
            PressState::Released,
            PressState::NotChanged,
        ]
    );
    assert!(!tracker.found());
}

#[test]
fn stale_frames_are_skipped() {
    let (service, layout, mut stream) = setup();
    publish(&service, &layout, 5.0, Some(&camera_hand(true)));
    assert!(stream.poll(&service).unwrap().is_some());

    // an older frame republished by a restarted writer is ignored
    publish(&service, &layout, 4.0, Some(&camera_hand(false)));
    assert!(stream.poll(&service).unwrap().is_none());
    assert_eq!(stream.latest().unwrap().timestamp, 5.0);

    service.0.set_connected(false);
    assert!(stream.poll(&service).unwrap_err().is_recoverable());
}
