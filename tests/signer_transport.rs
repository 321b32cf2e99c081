//! End-to-end tests for the signed HTTP transport against a local stub.

#[path = "common/http_stub.rs"]
mod http_stub;

use serde_json::json;
use stratus::signer::{
    AwsClient, Credentials, HttpRequest, JSON_CONTENT_TYPE, QUERY_CONTENT_TYPE, RequestSigner,
    TransportError,
};

use http_stub::{HttpStub, StubResponse};

fn client(endpoint: &str, session_token: Option<&str>) -> AwsClient {
    let credentials = Credentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        session_token.map(str::to_owned),
    )
    .expect("credentials");
    let signer = RequestSigner::new(credentials, "cloudformation", "eu-west-1").expect("signer");
    AwsClient::new(signer, Some(endpoint)).expect("client")
}

#[tokio::test]
async fn query_request_is_signed_and_form_encoded() {
    let stub = HttpStub::start(vec![StubResponse::xml(
        200,
        "<ListStacksResponse><ListStacksResult><StackSummaries/></ListStacksResult>\
         </ListStacksResponse>",
    )])
    .await;
    let client = client(stub.endpoint(), None);

    let response = client
        .query_request(
            "ListStacks",
            "2010-05-15",
            &[(String::from("StackStatusFilter.member.1"), String::from("CREATE_COMPLETE"))],
        )
        .await
        .expect("request succeeds");

    assert!(response.is_some_and(|value| value.get("ListStacksResponse").is_some()));
    let requests = stub.requests();
    let request = requests.first().expect("one request received");
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/");
    assert_eq!(request.header("content-type"), Some(QUERY_CONTENT_TYPE));
    assert_eq!(request.form_field("Action"), Some("ListStacks"));
    assert_eq!(request.form_field("Version"), Some("2010-05-15"));
    assert_eq!(
        request.form_field("StackStatusFilter.member.1"),
        Some("CREATE_COMPLETE")
    );

    let authorization = request.header("authorization").expect("signed");
    assert!(
        authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"),
        "{authorization}"
    );
    assert!(
        authorization.contains("/eu-west-1/cloudformation/aws4_request"),
        "{authorization}"
    );
    assert!(
        authorization.contains("SignedHeaders=content-type;host;x-amz-date,"),
        "{authorization}"
    );
    assert!(request.header("x-amz-date").is_some());
    assert!(request.header("x-amz-security-token").is_none());
}

#[tokio::test]
async fn session_token_is_sent_and_signed() {
    let stub = HttpStub::start(vec![StubResponse::empty(200)]).await;
    let client = client(stub.endpoint(), Some("session-token"));

    let response = client
        .send(HttpRequest::new("GET", client.host()).path("/health"))
        .await
        .expect("request succeeds");

    assert_eq!(response, None);
    let requests = stub.requests();
    let request = requests.first().expect("one request received");
    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/health");
    assert_eq!(request.header("x-amz-security-token"), Some("session-token"));
    let authorization = request.header("authorization").expect("signed");
    assert!(
        authorization.contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"),
        "{authorization}"
    );
}

#[tokio::test]
async fn query_parameters_are_sent_in_canonical_order() {
    let stub = HttpStub::start(vec![StubResponse::empty(204)]).await;
    let client = client(stub.endpoint(), None);

    client
        .send(
            HttpRequest::new("GET", client.host())
                .query_param("b", "2")
                .query_param("a", "x y"),
        )
        .await
        .expect("request succeeds");

    let requests = stub.requests();
    let request = requests.first().expect("one request received");
    assert_eq!(request.target, "/?a=x%20y&b=2");
}

#[tokio::test]
async fn xml_error_envelope_becomes_provider_error() {
    let stub = HttpStub::start(vec![StubResponse::xml(
        400,
        "<ErrorResponse><Error><Type>Sender</Type><Code>ValidationError</Code>\
         <Message>Stack with id web does not exist</Message></Error>\
         <RequestId>1</RequestId></ErrorResponse>",
    )])
    .await;
    let client = client(stub.endpoint(), None);

    let err = client
        .query_request("DescribeStacks", "2010-05-15", &[])
        .await
        .expect_err("provider error");

    assert_eq!(
        err,
        TransportError::Provider {
            status: 400,
            code: String::from("ValidationError"),
            message: String::from("Stack with id web does not exist"),
        }
    );
}

#[tokio::test]
async fn json_request_carries_target_and_decodes_json() {
    let stub = HttpStub::start(vec![StubResponse::json(
        200,
        r#"{"Table": {"TableName": "events", "TableStatus": "ACTIVE"}}"#,
    )])
    .await;
    let client = client(stub.endpoint(), None);

    let response = client
        .json_request(
            "DynamoDB_20120810.DescribeTable",
            &json!({"TableName": "events"}),
        )
        .await
        .expect("request succeeds")
        .expect("body decoded");

    assert_eq!(response["Table"]["TableStatus"], json!("ACTIVE"));
    let requests = stub.requests();
    let request = requests.first().expect("one request received");
    assert_eq!(request.header("content-type"), Some(JSON_CONTENT_TYPE));
    assert_eq!(
        request.header("x-amz-target"),
        Some("DynamoDB_20120810.DescribeTable")
    );
    assert_eq!(request.body, r#"{"TableName":"events"}"#);
}

#[tokio::test]
async fn json_error_envelope_becomes_provider_error() {
    let stub = HttpStub::start(vec![StubResponse::json(
        400,
        r#"{"__type": "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException",
            "message": "Requested resource not found"}"#,
    )])
    .await;
    let client = client(stub.endpoint(), None);

    let err = client
        .json_request("DynamoDB_20120810.DescribeTable", &json!({}))
        .await
        .expect_err("provider error");

    assert!(
        matches!(
            &err,
            TransportError::Provider { code, .. } if code == "ResourceNotFoundException"
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn server_error_without_envelope_is_an_http_error() {
    let stub = HttpStub::start(vec![StubResponse::empty(503)]).await;
    let client = client(stub.endpoint(), None);

    let err = client
        .query_request("DescribeStacks", "2010-05-15", &[])
        .await
        .expect_err("http error");

    assert!(
        matches!(err, TransportError::Http { status: 503, .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let client = client("http://127.0.0.1:9", None);

    let err = client
        .query_request("DescribeStacks", "2010-05-15", &[])
        .await
        .expect_err("nothing listens on the discard port");

    assert!(
        matches!(err, TransportError::Network(_)),
        "unexpected error: {err}"
    );
}
