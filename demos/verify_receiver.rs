use asset_compute_commons::{parse_signature_header, sign, verify_webhook_body, verify_webhook_request, SIGNATURE_HEADER};

const PRIVATE_KEY: &str = include_str!("../tests/fixtures/private_key.pem");
const PUBLIC_KEY: &str = include_str!("../tests/fixtures/public_key.pem");

fn main() {
    let body = br#"{"user_guid":"org","event_code":"asset_compute","event":{"type":"rendition_created"}}"#;

    // Normally done by the sender.
    let signature = match sign(body, PRIVATE_KEY) {
        Ok(signature) => signature,
        Err(err) => {
            eprintln!("signing failed: {err}");
            return;
        }
    };

    let headers = vec![
        ("Content-Type", "application/json"),
        (SIGNATURE_HEADER, signature.as_str()),
    ];

    match verify_webhook_request(headers.iter().map(|(k, v)| (*k, *v)), body, PUBLIC_KEY) {
        Ok(true) => println!("signature valid"),
        Ok(false) => println!("signature invalid"),
        Err(err) => eprintln!("could not verify: {err}"),
    }

    // Frameworks that hand over the header value directly can skip the lookup.
    let header_value = parse_signature_header(headers.iter().map(|(k, v)| (*k, *v)), SIGNATURE_HEADER).unwrap_or_default();
    match verify_webhook_body(body, &header_value, PUBLIC_KEY) {
        Ok(valid) => println!("body check: {}", if valid { "valid" } else { "invalid" }),
        Err(err) => eprintln!("could not verify: {err}"),
    }
}
