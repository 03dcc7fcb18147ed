#![no_main]

use funxmpp::core::codec::{decode_node, encode_tree, Decoded, Reader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the tree decoder
    if let Ok(node) = decode_node(data) {
        // Anything that decodes must re-encode to an equal tree
        if let Ok(body) = encode_tree(&node) {
            assert_eq!(decode_node(&body).ok(), Some(node));
        }
    }

    // Same bytes through the framed reader, stopping at the first error
    let mut reader = Reader::new();
    reader.data(data);
    while let Ok(Decoded::Node(_)) = reader.read() {}
});
