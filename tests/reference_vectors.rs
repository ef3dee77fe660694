//! Integration tests: digests against the `scrypt` crate
//!
//! Every supported group count has to produce exactly the digests of a
//! plain scrypt(N=1024, r=1, p=1), whatever the pairing layout.

use romix_simt::device::layout::WORK_UNIT_WORDS;
use romix_simt::hash::{romix_input, state_to_bytes};
use romix_simt::{
    hash_one, DeviceConfig, Dispatcher, LaunchConfig, ScryptHasher, HEADER_LEN,
    MAX_GROUPS_PER_BLOCK,
};

const LOG_N: u8 = 10;

fn expected_scrypt(password: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let params = scrypt::Params::new(LOG_N, 1, 1, 32).unwrap();
    let mut out = vec![0u8; len];
    scrypt::scrypt(password, salt, &params, &mut out).expect("scrypt failed");
    out
}

fn config(groups: usize, blocks: usize) -> LaunchConfig {
    LaunchConfig::new(groups, blocks).with_device(DeviceConfig {
        resident_blocks: 2,
        ..DeviceConfig::default()
    })
}

fn passwords(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("password{i}").into_bytes(), b"salt".to_vec()))
        .collect()
}

#[test]
fn test_single_hash_matches_scrypt() {
    let mut out = [0u8; 64];
    hash_one(b"password", b"NaCl", &mut out).unwrap();
    assert_eq!(out.to_vec(), expected_scrypt(b"password", b"NaCl", 64));
}

#[test]
fn test_empty_password_and_salt() {
    let hasher = ScryptHasher::new(config(1, 1)).unwrap();
    let inputs: [(&[u8], &[u8]); 1] = [(b"", b"")];
    let digests = hasher.hash_batch(&inputs, 64).unwrap();
    assert_eq!(digests[0], expected_scrypt(b"", b"", 64));
}

#[test]
fn test_group_counts_match_scrypt() {
    // Odd counts leave a thread-group without a partner.
    for groups in [1, 2, 3, 5, 8, 13, MAX_GROUPS_PER_BLOCK] {
        let hasher = ScryptHasher::new(config(groups, 1)).unwrap();
        let inputs = passwords(hasher.capacity());
        let digests = hasher.hash_batch(&inputs, 32).unwrap();

        for ((password, salt), digest) in inputs.iter().zip(&digests) {
            assert_eq!(
                digest,
                &expected_scrypt(password, salt, 32),
                "groups={groups} password={}",
                String::from_utf8_lossy(password)
            );
        }
    }
}

#[test]
fn test_multi_block_launch_matches_scrypt() {
    let hasher = ScryptHasher::new(config(3, 4)).unwrap();
    assert_eq!(hasher.capacity(), 24);

    let inputs = passwords(hasher.capacity());
    let digests = hasher.hash_batch(&inputs, 32).unwrap();
    for ((password, salt), digest) in inputs.iter().zip(&digests) {
        assert_eq!(digest, &expected_scrypt(password, salt, 32));
    }
}

#[test]
fn test_block_headers() {
    let headers: Vec<[u8; HEADER_LEN]> = (0u8..5)
        .map(|n| {
            let mut header = [0u8; HEADER_LEN];
            for (i, b) in header.iter_mut().enumerate() {
                *b = (i as u8).wrapping_mul(7) ^ n;
            }
            header
        })
        .collect();

    let hasher = ScryptHasher::new(config(2, 1)).unwrap();
    let digests = hasher.hash_headers(&headers).unwrap();
    for (header, digest) in headers.iter().zip(&digests) {
        assert_eq!(digest.to_vec(), expected_scrypt(header, header, 32));
    }
}

#[test]
fn test_dispatcher_output_is_romix_state() {
    // Raw dispatch: the second PBKDF2 pass over the output must give scrypt.
    let dispatcher = Dispatcher::new(config(1, 1)).unwrap();
    let inputs = passwords(dispatcher.capacity());

    let mut words = Vec::with_capacity(dispatcher.capacity() * WORK_UNIT_WORDS);
    for (password, salt) in &inputs {
        words.extend_from_slice(&romix_input(password, salt).unwrap());
    }

    let (output, report) = dispatcher.dispatch(&words).unwrap();
    assert_eq!(report.work_units, 2);

    for (unit, (password, salt)) in inputs.iter().enumerate() {
        let mut state = [0u32; WORK_UNIT_WORDS];
        state.copy_from_slice(&output[unit * WORK_UNIT_WORDS..(unit + 1) * WORK_UNIT_WORDS]);

        let mut digest = [0u8; 32];
        romix_simt::hash::pbkdf2_sha256(password, &state_to_bytes(&state), &mut digest).unwrap();
        assert_eq!(digest.to_vec(), expected_scrypt(password, salt, 32));
    }
}
