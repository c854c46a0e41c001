//! End-to-end scenarios: whole messages in, canonical messages (or
//! structured lookups) out.

use mailsoup::{read_message, AddressKind, AddressParser, Field};

#[test]
fn classic() {
    let msg = read_message(b"From: Foo Bar <foo@bar.example>\r\nSubject: Hi\r\n\r\nBody\r\n")
        .unwrap();
    let h = msg.header().unwrap();
    let from = h.addresses("From");
    assert_eq!(from.len(), 1);
    assert_eq!(from[0].kind(), AddressKind::Normal);
    assert_eq!(from[0].raw_name(), "Foo Bar");
    assert_eq!(from[0].localpart, "foo");
    assert_eq!(from[0].domain, "bar.example");
    assert_eq!(h.subject(), "Hi");
    assert_eq!(msg.body(false), b"Body\r\n".to_vec());
}

#[test]
fn encoded_word_subject() {
    let msg = read_message(b"Subject: =?ISO-8859-1?Q?foo_bar?=\r\n\r\n").unwrap();
    assert_eq!(msg.header().unwrap().subject(), "foo bar");
}

#[test]
fn cfws_address_group() {
    let msg = read_message(
        b"To: A Group:Chris Jones <c@public.example>,joe@example.org,John <jdoe@one.test>;\r\n\r\n",
    )
    .unwrap();
    let to = msg.header().unwrap().addresses("To");
    assert_eq!(to.len(), 3);
    assert_eq!(to[0].raw_name(), "Chris Jones");
    assert_eq!(to[0].lpdomain(), "c@public.example");
    assert_eq!(to[1].raw_name(), "");
    assert_eq!(to[1].lpdomain(), "joe@example.org");
    assert_eq!(to[2].raw_name(), "John");
    assert_eq!(to[2].lpdomain(), "jdoe@one.test");
}

#[test]
fn multipart_with_text_and_image() {
    let image = b"\x89PNG\r\n\x1a\n0123456789";
    let input = format!(
        concat!(
            "From: x@y.example\r\n",
            "Date: Sun, 25 Sep 2016 18:36:33 -0400\r\n",
            "Mime-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "A\r\n",
            "--b\r\n",
            "Content-Type: image/png\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "{}\r\n",
            "--b--\r\n"
        ),
        base64::encode(&image[..])
    );
    let msg = read_message(input.as_bytes()).unwrap();
    assert_eq!(msg.part.parts.len(), 2);
    assert_eq!(msg.part.parts[0].text, "A");
    assert_eq!(msg.part.parts[1].data.len(), image.len());
}

#[test]
fn multipart_missing_final_terminator() {
    let input = concat!(
        "From: x@y.example\r\n",
        "Date: Sun, 25 Sep 2016 18:36:33 -0400\r\n",
        "Content-Type: multipart/mixed; boundary=b\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "A\r\n",
        "--b\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "B\r\n"
    );
    let msg = read_message(input.as_bytes()).unwrap();
    assert_eq!(msg.part.parts.len(), 2);
}

#[test]
fn mime_version_spam() {
    let msg = read_message(
        b"From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: text/html; charset=utf-8\r\nMime-Version: 1.1\r\n\r\n<html>hi</html>\r\n",
    )
    .unwrap();
    assert_eq!(
        msg.header().unwrap().get("Mime-Version"),
        "1.0(Note: Original mime-version had syntax problems)"
    );
}

#[test]
fn bounce_from_repair() {
    let msg = read_message(
        b"From: <>\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nMessage-Id: <x@deep.example.co.uk>\r\n\r\nhello\r\n",
    )
    .unwrap();
    let from = msg.header().unwrap().addresses("From");
    assert_eq!(from.len(), 1);
    assert_eq!(from[0].lpdomain(), "postmaster@example.co.uk");
    assert!(msg.header().unwrap().valid());
}

#[test]
fn references_with_garbage() {
    let p = AddressParser::references("<a@b> garbage <c@d>");
    assert!(p.error().is_none());
    assert_eq!(p.addresses.len(), 2);

    let f = Field::new("References", "<a@b> garbage <c@d>");
    assert!(f.valid());
    assert_eq!(f.rfc822(false), "<a@b> <c@d>");
}

#[test]
fn field_serialization_is_idempotent() {
    let cases = &[
        ("Subject", "=?ISO-8859-1?Q?foo_bar?="),
        ("From", "Foo Bar <foo@bar.example>"),
        ("To", "a@one.test, John <jdoe@one.test>"),
        ("Content-Type", "multipart/mixed; boundary=b"),
        ("Content-Disposition", "attachment; filename=x.pdf"),
        ("Return-Path", "<>"),
        ("Message-Id", "<x@y.example>"),
    ];
    for (name, value) in cases {
        let once = Field::new(name, value).rfc822(false);
        let again = Field::new(name, &once).rfc822(false);
        assert_eq!(once, again, "{}: {}", name, value);
    }
}

#[test]
fn message_round_trip_is_stable() {
    let inputs: &[&[u8]] = &[
        b"From: Foo Bar <foo@bar.example>\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nSubject: Hi\r\n\r\nBody\r\n",
        b"From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Type: text/plain\r\n\r\nA\r\n--b--\r\n",
        b"From: <>\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nMessage-Id: <x@deep.example.co.uk>\r\n\r\nhello\r\n",
    ];
    for input in inputs {
        let once = read_message(input).unwrap().rfc822(false);
        let again = read_message(&once).unwrap().rfc822(false);
        assert_eq!(
            String::from_utf8_lossy(&once),
            String::from_utf8_lossy(&again)
        );
    }
}

#[test]
fn mbox_envelope_and_lf_endings() {
    let msg = read_message(
        b"From joe@example.org Mon Sep 17 00:00:00 2001\nFrom: joe@example.org\nDate: Sun, 25 Sep 2016 18:36:33 -0400\nSubject: lf only\n\nbody\n",
    )
    .unwrap();
    let h = msg.header().unwrap();
    assert_eq!(h.subject(), "lf only");
    assert_eq!(h.addresses("From").len(), 1);
}

#[test]
fn avoid_utf8_downgrades_headers() {
    let msg = read_message(
        b"From: =?utf-8?q?H=C3=A9lo=C3=AFse?= <h@x.example>\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nSubject: =?utf-8?q?tr=C3=A8s_bien?=\r\n\r\nbody\r\n",
    )
    .unwrap();
    assert_eq!(msg.header().unwrap().subject(), "très bien");
    let downgraded = msg.rfc822(true);
    let text = String::from_utf8_lossy(&downgraded);
    let header_part = text.split("\r\n\r\n").next().unwrap();
    assert!(header_part.is_ascii(), "header not 7-bit: {}", header_part);
    assert!(header_part.contains("=?utf-8?"));
}
