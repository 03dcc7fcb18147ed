#![no_main]

use funxmpp::protocol::handshake::{client_handshake, server_handshake};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // Split input into a challenge and a forged response token
    let (challenge, token) = data.split_at(data.len() / 2);
    let Ok(mut server) = server_handshake("31612345678", b"secret", challenge) else {
        return;
    };
    let _ = server.verify_response(token);

    if let Ok(client) = client_handshake("31612345678", b"secret", challenge) {
        let mut server = server_handshake("31612345678", b"secret", challenge).unwrap();
        assert!(server.verify_response(&client.response).is_ok());
    }
});
