use super::*;

#[test]
fn test_sign_and_verify() {
    let editor = Keypair::generate();
    let message = b"container bytes";

    let signature = editor.sign(message);
    assert!(verify_signature(&editor.editor_public_key(), message, &signature).is_ok());
}

#[test]
fn test_wrong_key_fails() {
    let editor = Keypair::generate();
    let other = Keypair::generate();
    let message = b"container bytes";

    let signature = editor.sign(message);
    assert_eq!(
        verify_signature(&other.editor_public_key(), message, &signature),
        Err(CryptoError::InvalidSignature)
    );
}

#[test]
fn test_tampered_message_fails() {
    let editor = Keypair::generate();
    let signature = editor.sign(b"original");

    assert_eq!(
        verify_signature(&editor.editor_public_key(), b"tampered", &signature),
        Err(CryptoError::InvalidSignature)
    );
}

#[test]
fn test_proof_of_knowledge_roundtrip() {
    let editor = Keypair::generate();
    let uri = Keypair::generate();

    let pok = uri.prove_knowledge(&editor.editor_public_key());
    assert!(verify_pok(&uri.info_hash(), &editor.editor_public_key(), &pok).is_ok());

    // A proof minted for one editor does not authorize another.
    let impostor = Keypair::generate();
    assert_eq!(
        verify_pok(&uri.info_hash(), &impostor.editor_public_key(), &pok),
        Err(CryptoError::InvalidProofOfKnowledge)
    );
}

#[test]
fn test_seed_roundtrip_is_deterministic() {
    let original = Keypair::generate();
    let seed = original.signing_key.to_bytes();

    let reloaded = Keypair::from_seed(&seed);
    assert_eq!(original.public_bytes(), reloaded.public_bytes());
    assert_eq!(original.sign(b"message"), reloaded.sign(b"message"));
}

#[test]
fn test_garbage_key_is_an_invalid_signature() {
    // All-0xff is not a canonical curve point; verification must fail
    // closed rather than error out.
    let garbage = EditorPublicKey([0xff; 32]);
    let signature = [0u8; 64];
    assert_eq!(
        verify_signature(&garbage, b"message", &signature),
        Err(CryptoError::InvalidSignature)
    );
}
