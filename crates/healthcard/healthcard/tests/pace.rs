mod common;

use common::{EF_VERSION2_GENERATION1, FakeCard};
use egk_apdu_core::{CardExecutor, CardTransport, Executor, SecurityLevel, TransportError};
use egk_healthcard::ec::BrainpoolCurve;
use egk_healthcard::{
    AuthenticationError, CapabilityError, Error, ErrorKind, HealthCard, PaceHandshake, PaceState,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const CAN: &str = "123123";

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

#[test]
fn test_both_sides_agree_on_keys() {
    for curve in [
        BrainpoolCurve::P256r1,
        BrainpoolCurve::P384r1,
        BrainpoolCurve::P512r1,
    ] {
        let mut card = HealthCard::new(FakeCard::with_curve(CAN, curve));
        let key = card.establish_secure_channel(CAN, &mut rng()).unwrap();

        let fake = card.executor().transport();
        assert_eq!(fake.agreed_key.as_ref(), Some(&key), "{curve:?}");
        assert_eq!(fake.calls, 9);
        assert!(card.is_secure_channel_established());
        assert_eq!(card.executor().security_level(), SecurityLevel::full());
    }
}

#[test]
fn test_command_sequence() {
    let mut card = HealthCard::new(FakeCard::new(CAN));
    card.establish_secure_channel(CAN, &mut rng()).unwrap();

    let fake = card.executor().transport();
    assert_eq!(
        fake.instructions(),
        [0xA4, 0xB0, 0xA4, 0xB0, 0x22, 0x86, 0x86, 0x86, 0x86]
    );
    // rounds 1 to 3 are chained, the last one is not
    let classes: Vec<u8> = fake.commands[5..].iter().map(|c| c[0]).collect();
    assert_eq!(classes, [0x10, 0x10, 0x10, 0x00]);
    assert_eq!(&fake.commands[5][..], &[0x10, 0x86, 0x00, 0x00, 0x02, 0x7C, 0x00, 0x00]);
}

#[test]
fn test_state_machine_reaches_authenticated() {
    let mut executor = CardExecutor::new(FakeCard::new(CAN));
    let mut rng = rng();
    let mut handshake = PaceHandshake::new(&mut executor, &mut rng);
    assert_eq!(handshake.state(), PaceState::Init);

    handshake.run(CAN).unwrap();
    assert_eq!(handshake.state(), PaceState::Authenticated);
    assert!(matches!(handshake.run(CAN), Err(Error::InvalidInput(_))));
}

#[test]
fn test_same_randomness_same_keys() {
    let first = HealthCard::new(FakeCard::new(CAN))
        .establish_secure_channel(CAN, &mut rng())
        .unwrap();
    let second = HealthCard::new(FakeCard::new(CAN))
        .establish_secure_channel(CAN, &mut rng())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_tampered_pk2_fails_authentication() {
    for index in [1, 17, 32, 33, 64] {
        let mut fake = FakeCard::new(CAN);
        fake.tamper_pk2 = Some(index);
        let mut card = HealthCard::new(fake);

        let err = card.establish_secure_channel(CAN, &mut rng()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication, "byte {index}: {err}");
        assert_eq!(card.executor().transport().calls, 9);
        assert!(card.executor().transport().agreed_key.is_none());
        assert!(!card.is_secure_channel_established());
    }
}

#[test]
fn test_card_token_checked_by_host() {
    let mut fake = FakeCard::new(CAN);
    fake.tamper_card_token = true;
    let mut card = HealthCard::new(fake);

    let err = card.establish_secure_channel(CAN, &mut rng()).unwrap_err();
    assert_eq!(err, Error::Authentication(AuthenticationError::TokenMismatch));
    // the card accepted our token, only our own check can have failed
    assert!(card.executor().transport().agreed_key.is_some());
    assert_eq!(card.executor().transport().calls, 9);
    assert!(!card.is_secure_channel_established());
}

#[test]
fn test_card_token_mismatch_fails_handshake() {
    let mut executor = CardExecutor::new(FakeCard::new(CAN));
    executor.transport_mut().tamper_card_token = true;
    let mut rng = rng();
    let mut handshake = PaceHandshake::new(&mut executor, &mut rng);

    let result = handshake.run(CAN);
    assert!(matches!(
        result,
        Err(Error::Authentication(AuthenticationError::TokenMismatch))
    ));
    assert_eq!(handshake.state(), PaceState::Failed);
}

#[test]
fn test_capability_reads_accept_end_of_file_warning() {
    for eof_warning in [true, false] {
        let mut fake = FakeCard::new(CAN);
        fake.eof_warning = eof_warning;
        let mut card = HealthCard::new(fake);

        card.establish_secure_channel(CAN, &mut rng()).unwrap();
        let fake = card.executor().transport();
        assert_eq!(&fake.commands[1][..], &[0x00, 0xB0, 0x91, 0x00, 0x00]);
        assert_eq!(&fake.commands[3][..], &[0x00, 0xB0, 0x00, 0x00, 0x00]);
    }
}

#[test]
fn test_wrong_can_rejected() {
    let mut card = HealthCard::new(FakeCard::new(CAN));
    let err = card.establish_secure_channel("654321", &mut rng()).unwrap_err();
    assert_eq!(
        err,
        Error::Authentication(AuthenticationError::CardRejectedAccessNumber)
    );
    assert_eq!(card.executor().transport().calls, 9);
}

#[test]
fn test_fail_fast_per_step() {
    // (failing call, expected classification)
    let steps = [
        (1, ErrorKind::Capability),
        (2, ErrorKind::Capability),
        (3, ErrorKind::Capability),
        (4, ErrorKind::Capability),
        (5, ErrorKind::Capability),
        (6, ErrorKind::Protocol),
        (7, ErrorKind::Protocol),
        (8, ErrorKind::Protocol),
        (9, ErrorKind::Protocol),
    ];
    for (call, kind) in steps {
        let mut executor = CardExecutor::new(FakeCard::new(CAN));
        executor.transport_mut().fail_at = Some(call);
        let mut rng = rng();
        let mut handshake = PaceHandshake::new(&mut executor, &mut rng);

        let err = handshake.run(CAN).unwrap_err();
        assert_eq!(err.kind(), kind, "call {call}: {err}");
        assert_eq!(handshake.state(), PaceState::Failed);
        assert_eq!(executor.transport().calls, call);
        assert!(executor.transport().agreed_key.is_none());
    }
}

#[test]
fn test_old_card_refused() {
    let mut fake = FakeCard::new(CAN);
    fake.version = EF_VERSION2_GENERATION1.to_vec();
    let mut card = HealthCard::new(fake);

    let err = card.establish_secure_channel(CAN, &mut rng()).unwrap_err();
    assert_eq!(
        err,
        Error::Capability(CapabilityError::UnsupportedVersion(0x03_00_00))
    );
    assert_eq!(card.executor().transport().calls, 2);
}

#[test]
fn test_unsupported_curve_refused() {
    let mut fake = FakeCard::new(CAN);
    fake.card_access = vec![
        0x31, 0x14, 0x30, 0x12, 0x06, 0x0A, 0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x04, 0x02,
        0x02, 0x02, 0x01, 0x02, 0x02, 0x01, 0x0C,
    ];
    let mut card = HealthCard::new(fake);

    let err = card.establish_secure_channel(CAN, &mut rng()).unwrap_err();
    assert_eq!(
        err,
        Error::Capability(CapabilityError::UnsupportedParameterId(12))
    );
    assert_eq!(card.executor().transport().calls, 4);
}

#[test]
fn test_invalid_can_sends_nothing() {
    let mut card = HealthCard::new(FakeCard::new(CAN));
    for can in ["", "12a456"] {
        assert!(matches!(
            card.establish_secure_channel(can, &mut rng()),
            Err(Error::InvalidInput(_))
        ));
    }
    assert_eq!(card.executor().transport().calls, 0);
}

#[test]
fn test_cancellation_is_a_transport_error() {
    let mut fake = FakeCard::new(CAN);
    fake.cancel_after = Some(6);
    let mut card = HealthCard::new(fake);

    let err = card.establish_secure_channel(CAN, &mut rng()).unwrap_err();
    assert_eq!(err, Error::Transport(TransportError::Cancelled));
    assert_eq!(card.executor().transport().calls, 6);
    assert!(!card.executor().transport().is_connected());
    assert!(card.executor().transport().agreed_key.is_none());
}

#[test]
fn test_absent_card_never_receives_commands() {
    let mut fake = FakeCard::new(CAN);
    fake.present = false;
    let mut card = HealthCard::new(fake);

    let err = card.establish_secure_channel(CAN, &mut rng()).unwrap_err();
    assert_eq!(
        err,
        Error::Transport(TransportError::CardAbsent { attempts: 3 })
    );
    assert_eq!(card.executor().transport().calls, 0);
}
